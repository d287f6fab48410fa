use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum number of values accepted in a voice embedding
pub const MAX_EMBEDDING_LEN: usize = 4096;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceSignature {
    pub id: String,
    pub user_id: String,
    pub embedding: Vec<f32>,
    pub sample_count: i64,
    pub last_updated: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpsertVoiceSignatureRequest {
    pub embedding: Vec<f32>,
    pub sample_count: Option<i64>,
}

impl UpsertVoiceSignatureRequest {
    pub fn validate(&self) -> Result<(), String> {
        if self.embedding.is_empty() {
            return Err("Embedding cannot be empty".to_string());
        }
        if self.embedding.len() > MAX_EMBEDDING_LEN {
            return Err(format!(
                "Embedding cannot have more than {} values",
                MAX_EMBEDDING_LEN
            ));
        }
        if self.embedding.iter().any(|v| !v.is_finite()) {
            return Err("Embedding values must be finite numbers".to_string());
        }
        if matches!(self.sample_count, Some(n) if n < 1) {
            return Err("sample_count must be positive".to_string());
        }
        Ok(())
    }
}

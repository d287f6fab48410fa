use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SwarmStatus {
    #[default]
    Pending,
    Active,
    Failed,
}

/// Swarm row without its secrets; keys are read separately and decrypted on demand
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Swarm {
    pub id: String,
    pub workspace_id: String,
    pub name: String,
    pub swarm_url: String,
    pub status: SwarmStatus,
    pub pool_name: Option<String>,
    pub ingest_ref_id: Option<String>,
    pub has_swarm_api_key: bool,
    pub has_pool_api_key: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpsertSwarmRequest {
    pub name: String,
    pub swarm_url: String,
    pub swarm_api_key: Option<String>,
    pub pool_name: Option<String>,
    pub pool_api_key: Option<String>,
}

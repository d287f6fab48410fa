//! Stakgraph ingest job statuses and the repository transitions they drive

use std::str::FromStr;

use serde::Deserialize;
use serde_json::Value;

use crate::models::RepositoryStatus;

/// Webhook delivery source name used for dedup
pub const INGEST_WEBHOOK_SOURCE: &str = "stakgraph";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestStatus {
    InProgress,
    Complete,
    Failed,
}

impl IngestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "InProgress",
            Self::Complete => "Complete",
            Self::Failed => "Failed",
        }
    }
}

impl FromStr for IngestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| *c != '_' && *c != '-' && *c != ' ')
            .collect::<String>()
            .to_lowercase();
        match normalized.as_str() {
            "inprogress" => Ok(Self::InProgress),
            "complete" | "completed" => Ok(Self::Complete),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Unknown ingest status '{}'", s)),
        }
    }
}

/// Body posted by stakgraph to the ingest webhook
#[derive(Debug, Clone, Deserialize)]
pub struct IngestWebhookPayload {
    pub request_id: String,
    pub status: String,
    pub progress: Option<f64>,
    pub result: Option<Value>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestTransition {
    Apply(RepositoryStatus),
    Unchanged,
}

/// Decide the repository status after an ingest status update. A repository that
/// already finished (synced or failed) ignores late progress reports.
pub fn next_repository_status(current: RepositoryStatus, incoming: IngestStatus) -> IngestTransition {
    let target = match incoming {
        IngestStatus::InProgress => {
            if matches!(current, RepositoryStatus::Synced | RepositoryStatus::Failed) {
                return IngestTransition::Unchanged;
            }
            RepositoryStatus::Pending
        }
        IngestStatus::Complete => RepositoryStatus::Synced,
        IngestStatus::Failed => RepositoryStatus::Failed,
    };

    if target == current {
        IngestTransition::Unchanged
    } else {
        IngestTransition::Apply(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_status() {
        assert_eq!("InProgress".parse::<IngestStatus>().unwrap(), IngestStatus::InProgress);
        assert_eq!("in_progress".parse::<IngestStatus>().unwrap(), IngestStatus::InProgress);
        assert_eq!("COMPLETE".parse::<IngestStatus>().unwrap(), IngestStatus::Complete);
        assert_eq!("failed".parse::<IngestStatus>().unwrap(), IngestStatus::Failed);
        assert!("queued".parse::<IngestStatus>().is_err());
    }

    #[test]
    fn test_transitions() {
        use IngestTransition::*;
        use RepositoryStatus::*;

        assert_eq!(next_repository_status(Pending, IngestStatus::InProgress), Unchanged);
        assert_eq!(next_repository_status(Pending, IngestStatus::Complete), Apply(Synced));
        assert_eq!(next_repository_status(Pending, IngestStatus::Failed), Apply(Failed));
        assert_eq!(next_repository_status(Synced, IngestStatus::InProgress), Unchanged);
        assert_eq!(next_repository_status(Failed, IngestStatus::InProgress), Unchanged);
        assert_eq!(next_repository_status(Synced, IngestStatus::Complete), Unchanged);
        assert_eq!(next_repository_status(Failed, IngestStatus::Complete), Apply(Synced));
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum PodStatus {
    Pending,
    Starting,
    Running,
    Stopped,
    Failed,
    Crashing,
    Terminating,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum UsageStatus {
    #[default]
    Unused,
    Used,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pod {
    pub id: String,
    pub swarm_id: String,
    pub pod_id: String,
    pub status: PodStatus,
    pub usage_status: UsageStatus,
    pub usage_status_marked_at: Option<DateTime<Utc>>,
    pub usage_status_marked_by: Option<String>,
    pub frontend_url: Option<String>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One pod as reported by the pool manager
#[derive(Debug, Clone, Deserialize)]
pub struct PodReport {
    pub pod_id: String,
    pub status: PodStatus,
    pub frontend_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoolStatus {
    pub running_vms: u32,
    pub pending_vms: u32,
    pub failed_vms: u32,
    pub used_vms: u32,
    pub unused_vms: u32,
    pub last_check: DateTime<Utc>,
}

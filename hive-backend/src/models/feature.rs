use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use super::double_option;
use super::Priority;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum FeatureStatus {
    #[default]
    Backlog,
    Planned,
    InProgress,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feature {
    pub id: String,
    pub workspace_id: String,
    pub title: String,
    pub brief: Option<String>,
    pub status: FeatureStatus,
    pub priority: Priority,
    pub assignee_id: Option<String>,
    pub created_by_id: String,
    #[serde(skip_serializing)]
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateFeatureRequest {
    pub workspace_id: String,
    pub title: String,
    pub brief: Option<String>,
    pub status: Option<FeatureStatus>,
    pub priority: Option<Priority>,
    pub assignee_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateFeatureRequest {
    pub title: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub brief: Option<Option<String>>,
    pub status: Option<FeatureStatus>,
    pub priority: Option<Priority>,
    #[serde(default, deserialize_with = "double_option")]
    pub assignee_id: Option<Option<String>>,
}

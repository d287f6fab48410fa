//! Mapping of Stakwork project statuses onto task workflow statuses

use crate::models::WorkflowStatus;

/// Map a Stakwork status string (case-insensitive). Unknown values yield `None`.
pub fn map_stakwork_status(status: &str) -> Option<WorkflowStatus> {
    match status.trim().to_lowercase().as_str() {
        "in_progress" | "running" | "processing" => Some(WorkflowStatus::InProgress),
        "completed" | "success" | "finished" => Some(WorkflowStatus::Completed),
        "error" => Some(WorkflowStatus::Error),
        "halted" | "paused" | "stopped" => Some(WorkflowStatus::Halted),
        "failed" => Some(WorkflowStatus::Failed),
        _ => None,
    }
}

/// Whether an incoming status should overwrite the current one.
/// A completed workflow never goes back to in-progress.
pub fn should_apply(current: WorkflowStatus, incoming: WorkflowStatus) -> bool {
    if current == incoming {
        return false;
    }
    !(current == WorkflowStatus::Completed && incoming == WorkflowStatus::InProgress)
}

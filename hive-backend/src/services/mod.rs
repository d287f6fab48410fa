pub mod ingest;
pub mod pool_status;
pub mod pr_metrics;
pub mod slug;
pub mod workflow_status;

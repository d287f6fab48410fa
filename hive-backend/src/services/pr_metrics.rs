//! Pull request metrics over a time window

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::models::PullRequestRecord;

pub const DEFAULT_WINDOW_HOURS: i64 = 72;
pub const MAX_WINDOW_HOURS: i64 = 720;
/// Below this many PRs the success rate is not reported
pub const MIN_PRS_FOR_SUCCESS_RATE: u32 = 3;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrMetrics {
    pub window_hours: i64,
    pub pr_count: u32,
    pub merged_count: u32,
    pub open_count: u32,
    pub closed_count: u32,
    pub success_rate: Option<f64>,
    pub avg_time_to_merge_hours: Option<f64>,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Collapse status updates into one record per pull request.
///
/// Artifacts with the same `url` are the same PR: the most recently updated one supplies
/// the status, while the earliest `created_at` marks when the PR was opened. Records
/// without a url cannot be matched and are counted individually.
pub fn latest_per_pull_request(records: &[PullRequestRecord]) -> Vec<PullRequestRecord> {
    let mut collapsed: Vec<PullRequestRecord> = Vec::with_capacity(records.len());
    let mut by_url: HashMap<&str, usize> = HashMap::new();

    for record in records {
        let Some(url) = record.url.as_deref() else {
            collapsed.push(record.clone());
            continue;
        };
        match by_url.get(url) {
            Some(&idx) => {
                let existing = &mut collapsed[idx];
                let opened_at = existing.created_at.min(record.created_at);
                if (record.updated_at, record.created_at) >= (existing.updated_at, existing.created_at) {
                    *existing = record.clone();
                }
                existing.created_at = opened_at;
            }
            None => {
                by_url.insert(url, collapsed.len());
                collapsed.push(record.clone());
            }
        }
    }

    collapsed
}

pub fn compute_pr_metrics(
    records: &[PullRequestRecord],
    now: DateTime<Utc>,
    window_hours: i64,
) -> PrMetrics {
    let since = now - Duration::hours(window_hours);
    let mut metrics = PrMetrics {
        window_hours,
        pr_count: 0,
        merged_count: 0,
        open_count: 0,
        closed_count: 0,
        success_rate: None,
        avg_time_to_merge_hours: None,
    };
    let mut merge_seconds: i64 = 0;

    let pull_requests = latest_per_pull_request(records);
    for record in pull_requests.iter().filter(|r| r.created_at >= since) {
        metrics.pr_count += 1;
        match record.status.as_deref() {
            Some("DONE") => {
                metrics.merged_count += 1;
                let merged_at = record.merged_at.unwrap_or(record.updated_at);
                merge_seconds += (merged_at - record.created_at).num_seconds().max(0);
            }
            Some("CANCELLED") => metrics.closed_count += 1,
            Some("IN_PROGRESS") => metrics.open_count += 1,
            _ => {}
        }
    }

    if metrics.pr_count >= MIN_PRS_FOR_SUCCESS_RATE {
        metrics.success_rate = Some(round2(
            metrics.merged_count as f64 / metrics.pr_count as f64 * 100.0,
        ));
    }
    if metrics.merged_count > 0 {
        let avg_hours = merge_seconds as f64 / metrics.merged_count as f64 / 3600.0;
        metrics.avg_time_to_merge_hours = Some(round2(avg_hours));
    }

    metrics
}

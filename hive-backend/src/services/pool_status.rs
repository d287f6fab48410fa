//! Pool status aggregation over a swarm's pods

use chrono::{DateTime, Utc};

use crate::models::{Pod, PodStatus, PoolStatus, UsageStatus};

/// Summarise pod rows into VM counts. Soft-deleted pods are ignored; usage is only
/// counted for running pods.
pub fn aggregate_pool_status(pods: &[Pod], now: DateTime<Utc>) -> PoolStatus {
    let mut status = PoolStatus {
        running_vms: 0,
        pending_vms: 0,
        failed_vms: 0,
        used_vms: 0,
        unused_vms: 0,
        last_check: now,
    };
    let mut newest: Option<DateTime<Utc>> = None;

    for pod in pods.iter().filter(|p| p.deleted_at.is_none()) {
        match pod.status {
            PodStatus::Running => {
                status.running_vms += 1;
                match pod.usage_status {
                    UsageStatus::Used => status.used_vms += 1,
                    UsageStatus::Unused => status.unused_vms += 1,
                }
            }
            PodStatus::Pending | PodStatus::Starting => status.pending_vms += 1,
            PodStatus::Failed | PodStatus::Crashing => status.failed_vms += 1,
            PodStatus::Stopped | PodStatus::Terminating => {}
        }
        newest = newest.max(Some(pod.updated_at));
    }

    if let Some(newest) = newest {
        status.last_check = newest;
    }
    status
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn pod(id: &str, status: PodStatus, usage: UsageStatus, updated_at: DateTime<Utc>) -> Pod {
        Pod {
            id: id.to_string(),
            swarm_id: "swarm".to_string(),
            pod_id: id.to_string(),
            status,
            usage_status: usage,
            usage_status_marked_at: None,
            usage_status_marked_by: None,
            frontend_url: None,
            deleted_at: None,
            created_at: updated_at,
            updated_at,
        }
    }

    #[test]
    fn test_counts_by_status() {
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let pods = vec![
            pod("a", PodStatus::Running, UsageStatus::Used, t0),
            pod("b", PodStatus::Running, UsageStatus::Unused, t0 + Duration::minutes(5)),
            pod("c", PodStatus::Starting, UsageStatus::Unused, t0),
            pod("d", PodStatus::Pending, UsageStatus::Used, t0),
            pod("e", PodStatus::Crashing, UsageStatus::Unused, t0),
            pod("f", PodStatus::Failed, UsageStatus::Used, t0),
            pod("g", PodStatus::Stopped, UsageStatus::Unused, t0),
        ];

        let status = aggregate_pool_status(&pods, t0 + Duration::hours(1));
        assert_eq!(
            status,
            PoolStatus {
                running_vms: 2,
                pending_vms: 2,
                failed_vms: 2,
                used_vms: 1,
                unused_vms: 1,
                last_check: t0 + Duration::minutes(5),
            }
        );
    }

    #[test]
    fn test_deleted_pods_ignored() {
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let mut deleted = pod("a", PodStatus::Running, UsageStatus::Used, t0 + Duration::hours(2));
        deleted.deleted_at = Some(t0);

        let now = t0 + Duration::hours(3);
        let status = aggregate_pool_status(&[deleted], now);
        assert_eq!(status.running_vms, 0);
        assert_eq!(status.used_vms, 0);
        assert_eq!(status.last_check, now);
    }

    #[test]
    fn test_empty_pool_uses_now() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let status = aggregate_pool_status(&[], now);
        assert_eq!(status.running_vms + status.pending_vms + status.failed_vms, 0);
        assert_eq!(status.last_check, now);
    }
}

//! Pod database operations

use rusqlite::{OptionalExtension, Result as SqliteResult, Row};
use std::collections::HashSet;

use crate::db::{new_id, now_ts, parse_enum, parse_opt_ts, parse_ts};
use crate::models::{Pod, PodReport, PodStatus, UsageStatus};
use super::super::Database;

const POD_COLUMNS: &str = "id, swarm_id, pod_id, status, usage_status, usage_status_marked_at,
     usage_status_marked_by, frontend_url, deleted_at, created_at, updated_at";

impl Database {
    fn row_to_pod(row: &Row) -> SqliteResult<Pod> {
        let status: String = row.get(3)?;
        let usage_status: String = row.get(4)?;
        let created_at: String = row.get(9)?;
        let updated_at: String = row.get(10)?;
        Ok(Pod {
            id: row.get(0)?,
            swarm_id: row.get(1)?,
            pod_id: row.get(2)?,
            status: parse_enum(3, &status)?,
            usage_status: parse_enum(4, &usage_status)?,
            usage_status_marked_at: parse_opt_ts(5, row.get(5)?)?,
            usage_status_marked_by: row.get(6)?,
            frontend_url: row.get(7)?,
            deleted_at: parse_opt_ts(8, row.get(8)?)?,
            created_at: parse_ts(9, &created_at)?,
            updated_at: parse_ts(10, &updated_at)?,
        })
    }

    /// Pods of a swarm that have not been soft-deleted
    pub fn list_pods(&self, swarm_id: &str) -> SqliteResult<Vec<Pod>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM pods WHERE swarm_id = ?1 AND deleted_at IS NULL ORDER BY created_at, rowid",
            POD_COLUMNS
        ))?;
        let pods = stmt
            .query_map([swarm_id], Self::row_to_pod)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(pods)
    }

    /// Make the stored pods match a pool manager report: upsert reported pods
    /// (reviving soft-deleted ones) and soft-delete pods missing from the report.
    pub fn sync_pods(&self, swarm_id: &str, reports: &[PodReport]) -> SqliteResult<Vec<Pod>> {
        {
            let mut conn = self.conn.lock();
            let tx = conn.transaction()?;
            let now = now_ts();

            for report in reports {
                tx.execute(
                    "INSERT INTO pods (id, swarm_id, pod_id, status, usage_status, frontend_url, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
                     ON CONFLICT(swarm_id, pod_id) DO UPDATE SET
                        status = excluded.status,
                        frontend_url = COALESCE(excluded.frontend_url, frontend_url),
                        deleted_at = NULL,
                        updated_at = excluded.updated_at",
                    rusqlite::params![
                        new_id(),
                        swarm_id,
                        &report.pod_id,
                        report.status.as_ref(),
                        UsageStatus::Unused.as_ref(),
                        &report.frontend_url,
                        &now
                    ],
                )?;
            }

            let reported: HashSet<&str> = reports.iter().map(|r| r.pod_id.as_str()).collect();
            let live: Vec<String> = {
                let mut stmt =
                    tx.prepare("SELECT pod_id FROM pods WHERE swarm_id = ?1 AND deleted_at IS NULL")?;
                let rows = stmt
                    .query_map([swarm_id], |row| row.get::<_, String>(0))?
                    .filter_map(|r| r.ok())
                    .collect();
                rows
            };
            for pod_id in live.iter().filter(|id| !reported.contains(id.as_str())) {
                tx.execute(
                    "UPDATE pods SET deleted_at = ?1, updated_at = ?1 WHERE swarm_id = ?2 AND pod_id = ?3",
                    rusqlite::params![&now, swarm_id, pod_id],
                )?;
            }

            tx.commit()?;
        }
        self.list_pods(swarm_id)
    }

    /// Claim the oldest running, unused pod for `marked_by`. The select and update run
    /// under the connection lock, so two callers never receive the same pod.
    pub fn claim_pod(&self, swarm_id: &str, marked_by: &str) -> SqliteResult<Option<Pod>> {
        let conn = self.conn.lock();
        let candidate: Option<String> = conn
            .query_row(
                "SELECT id FROM pods
                 WHERE swarm_id = ?1 AND deleted_at IS NULL AND status = ?2 AND usage_status = ?3
                 ORDER BY created_at, rowid LIMIT 1",
                rusqlite::params![swarm_id, PodStatus::Running.as_ref(), UsageStatus::Unused.as_ref()],
                |row| row.get(0),
            )
            .optional()?;

        let Some(id) = candidate else {
            return Ok(None);
        };

        let now = now_ts();
        conn.execute(
            "UPDATE pods SET usage_status = ?1, usage_status_marked_at = ?2, usage_status_marked_by = ?3,
             updated_at = ?2 WHERE id = ?4",
            rusqlite::params![UsageStatus::Used.as_ref(), &now, marked_by, &id],
        )?;

        conn.query_row(
            &format!("SELECT {} FROM pods WHERE id = ?1", POD_COLUMNS),
            [&id],
            Self::row_to_pod,
        )
        .optional()
    }

    /// Mark a pod unused. Returns false when the pod is unknown or deleted.
    pub fn release_pod(&self, swarm_id: &str, pod_id: &str, marked_by: &str) -> SqliteResult<bool> {
        let conn = self.conn.lock();
        let now = now_ts();
        let rows = conn.execute(
            "UPDATE pods SET usage_status = ?1, usage_status_marked_at = ?2, usage_status_marked_by = ?3,
             updated_at = ?2 WHERE swarm_id = ?4 AND pod_id = ?5 AND deleted_at IS NULL",
            rusqlite::params![UsageStatus::Unused.as_ref(), &now, marked_by, swarm_id, pod_id],
        )?;
        Ok(rows > 0)
    }
}

#[cfg(test)]
mod tests {
    use crate::db::Database;
    use crate::models::*;

    fn report(pod_id: &str, status: PodStatus) -> PodReport {
        PodReport {
            pod_id: pod_id.to_string(),
            status,
            frontend_url: Some(format!("https://{}.example", pod_id)),
        }
    }

    fn setup() -> (Database, Swarm) {
        let db = Database::new(":memory:").unwrap();
        let owner = db.upsert_mock_user("owner").unwrap();
        let ws = db.create_workspace("Acme", "acme", None, &owner.id).unwrap();
        let swarm = db.upsert_swarm(&ws.id, "s", "https://a.example", None, None, None).unwrap();
        (db, swarm)
    }

    #[test]
    fn test_sync_soft_deletes_missing_pods() {
        let (db, swarm) = setup();
        db.sync_pods(&swarm.id, &[report("a", PodStatus::Running), report("b", PodStatus::Pending)])
            .unwrap();

        let pods = db.sync_pods(&swarm.id, &[report("b", PodStatus::Running)]).unwrap();
        assert_eq!(pods.len(), 1);
        assert_eq!(pods[0].pod_id, "b");
        assert_eq!(pods[0].status, PodStatus::Running);

        // A reported pod comes back
        let pods = db
            .sync_pods(&swarm.id, &[report("a", PodStatus::Running), report("b", PodStatus::Running)])
            .unwrap();
        assert_eq!(pods.len(), 2);
    }

    #[test]
    fn test_claim_and_release() {
        let (db, swarm) = setup();
        db.sync_pods(&swarm.id, &[report("a", PodStatus::Running), report("b", PodStatus::Failed)])
            .unwrap();

        let claimed = db.claim_pod(&swarm.id, "user-1").unwrap().unwrap();
        assert_eq!(claimed.pod_id, "a");
        assert_eq!(claimed.usage_status, UsageStatus::Used);
        assert_eq!(claimed.usage_status_marked_by.as_deref(), Some("user-1"));

        // Only a failed pod remains
        assert!(db.claim_pod(&swarm.id, "user-2").unwrap().is_none());

        assert!(db.release_pod(&swarm.id, "a", "user-1").unwrap());
        assert!(!db.release_pod(&swarm.id, "missing", "user-1").unwrap());
        assert_eq!(db.claim_pod(&swarm.id, "user-2").unwrap().unwrap().pod_id, "a");
    }
}

//! Processed webhook deliveries, used to drop redelivered events

use rusqlite::Result as SqliteResult;

use crate::db::now_ts;
use crate::models::{Repository, RepositoryStatus};
use super::super::Database;
use super::repositories::REPOSITORY_COLUMNS;

impl Database {
    /// Record a delivery and apply the repository status changes it causes in one
    /// transaction. `next_status` maps a repository's current status to its new one.
    ///
    /// Returns `None` without touching any row when the same `(source, request_id, status)`
    /// was already recorded, otherwise the number of repositories updated.
    pub fn apply_repository_delivery<F>(
        &self,
        source: &str,
        request_id: &str,
        delivery_status: &str,
        workspace_id: &str,
        next_status: F,
    ) -> SqliteResult<Option<usize>>
    where
        F: Fn(RepositoryStatus) -> Option<RepositoryStatus>,
    {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let now = now_ts();

        let inserted = tx.execute(
            "INSERT OR IGNORE INTO webhook_deliveries (source, request_id, status, received_at)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![source, request_id, delivery_status, &now],
        )?;
        if inserted == 0 {
            return Ok(None);
        }

        let repositories: Vec<Repository> = {
            let mut stmt = tx.prepare(&format!(
                "SELECT {} FROM repositories WHERE workspace_id = ?1 ORDER BY created_at, rowid",
                REPOSITORY_COLUMNS
            ))?;
            let rows = stmt.query_map([workspace_id], Self::row_to_repository)?;
            rows.collect::<SqliteResult<_>>()?
        };

        let mut updated = 0;
        for repository in &repositories {
            if let Some(next) = next_status(repository.status) {
                updated += tx.execute(
                    "UPDATE repositories SET status = ?1, updated_at = ?2 WHERE id = ?3",
                    rusqlite::params![next.as_ref(), &now, &repository.id],
                )?;
            }
        }

        tx.commit()?;
        Ok(Some(updated))
    }
}

#[cfg(test)]
mod tests {
    use crate::db::Database;
    use crate::models::RepositoryStatus;

    fn sync_pending(status: RepositoryStatus) -> Option<RepositoryStatus> {
        (status == RepositoryStatus::Pending).then_some(RepositoryStatus::Synced)
    }

    #[test]
    fn test_delivery_applies_once() {
        let db = Database::new(":memory:").unwrap();
        let owner = db.upsert_mock_user("owner").unwrap();
        let ws = db.create_workspace("Acme", "acme", None, &owner.id).unwrap();
        db.create_repository(&ws.id, "api", "https://github.com/acme/api", "main").unwrap();
        db.create_repository(&ws.id, "web", "https://github.com/acme/web", "main").unwrap();

        let updated = db
            .apply_repository_delivery("stakgraph", "req-1", "Complete", &ws.id, sync_pending)
            .unwrap();
        assert_eq!(updated, Some(2));
        assert!(db
            .list_repositories(&ws.id)
            .unwrap()
            .iter()
            .all(|r| r.status == RepositoryStatus::Synced));

        // Redelivery is reported as a duplicate and does not rerun the plan
        let duplicate = db
            .apply_repository_delivery("stakgraph", "req-1", "Complete", &ws.id, |_| {
                Some(RepositoryStatus::Failed)
            })
            .unwrap();
        assert_eq!(duplicate, None);
        assert!(db
            .list_repositories(&ws.id)
            .unwrap()
            .iter()
            .all(|r| r.status == RepositoryStatus::Synced));

        // Another status or source is a new delivery
        assert_eq!(
            db.apply_repository_delivery("stakgraph", "req-1", "Failed", &ws.id, |_| None).unwrap(),
            Some(0)
        );
        assert_eq!(
            db.apply_repository_delivery("stakwork", "req-1", "Complete", &ws.id, |_| None).unwrap(),
            Some(0)
        );
    }
}

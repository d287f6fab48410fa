//! Repository database operations

use rusqlite::{OptionalExtension, Result as SqliteResult, Row};

use crate::db::{new_id, now_ts, parse_enum, parse_ts};
use crate::models::{Repository, RepositoryStatus};
use super::super::Database;

pub(super) const REPOSITORY_COLUMNS: &str =
    "id, workspace_id, name, repository_url, branch, status, created_at, updated_at";

impl Database {
    pub(super) fn row_to_repository(row: &Row) -> SqliteResult<Repository> {
        let status: String = row.get(5)?;
        let created_at: String = row.get(6)?;
        let updated_at: String = row.get(7)?;
        Ok(Repository {
            id: row.get(0)?,
            workspace_id: row.get(1)?,
            name: row.get(2)?,
            repository_url: row.get(3)?,
            branch: row.get(4)?,
            status: parse_enum(5, &status)?,
            created_at: parse_ts(6, &created_at)?,
            updated_at: parse_ts(7, &updated_at)?,
        })
    }

    /// Insert a repository. Returns `None` when the URL already exists in the workspace.
    pub fn create_repository(
        &self,
        workspace_id: &str,
        name: &str,
        repository_url: &str,
        branch: &str,
    ) -> SqliteResult<Option<Repository>> {
        let id = new_id();
        let inserted = {
            let conn = self.conn.lock();
            let now = now_ts();
            conn.execute(
                "INSERT OR IGNORE INTO repositories (id, workspace_id, name, repository_url, branch, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
                rusqlite::params![
                    &id,
                    workspace_id,
                    name,
                    repository_url,
                    branch,
                    RepositoryStatus::Pending.as_ref(),
                    &now
                ],
            )?
        };
        if inserted == 0 {
            return Ok(None);
        }
        self.get_repository(&id)
    }

    pub fn get_repository(&self, id: &str) -> SqliteResult<Option<Repository>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("SELECT {} FROM repositories WHERE id = ?1", REPOSITORY_COLUMNS),
            [id],
            Self::row_to_repository,
        )
        .optional()
    }

    pub fn list_repositories(&self, workspace_id: &str) -> SqliteResult<Vec<Repository>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM repositories WHERE workspace_id = ?1 ORDER BY created_at, rowid",
            REPOSITORY_COLUMNS
        ))?;
        let repositories = stmt
            .query_map([workspace_id], Self::row_to_repository)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(repositories)
    }

    pub fn set_repository_status(&self, id: &str, status: RepositoryStatus) -> SqliteResult<bool> {
        let conn = self.conn.lock();
        let rows = conn.execute(
            "UPDATE repositories SET status = ?1, updated_at = ?2 WHERE id = ?3",
            rusqlite::params![status.as_ref(), now_ts(), id],
        )?;
        Ok(rows > 0)
    }
}

#[cfg(test)]
mod tests {
    use crate::db::Database;
    use crate::models::RepositoryStatus;

    #[test]
    fn test_repository_crud() {
        let db = Database::new(":memory:").unwrap();
        let owner = db.upsert_mock_user("owner").unwrap();
        let ws = db.create_workspace("Acme", "acme", None, &owner.id).unwrap();

        let repo = db
            .create_repository(&ws.id, "app", "https://github.com/acme/app", "main")
            .unwrap()
            .unwrap();
        assert_eq!(repo.status, RepositoryStatus::Pending);

        // Same URL in the same workspace is rejected
        assert!(db
            .create_repository(&ws.id, "app", "https://github.com/acme/app", "dev")
            .unwrap()
            .is_none());

        assert!(db.set_repository_status(&repo.id, RepositoryStatus::Synced).unwrap());
        let repos = db.list_repositories(&ws.id).unwrap();
        assert_eq!(repos.len(), 1);
        assert_eq!(repos[0].status, RepositoryStatus::Synced);
    }
}

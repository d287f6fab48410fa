//! Feature (roadmap item) database operations

use rusqlite::{OptionalExtension, Result as SqliteResult, Row};

use crate::db::{new_id, now_ts, parse_enum, parse_ts};
use crate::models::{Feature, FeatureStatus, Priority, UpdateFeatureRequest};
use super::super::Database;

const FEATURE_COLUMNS: &str =
    "id, workspace_id, title, brief, status, priority, assignee_id, created_by_id, deleted, created_at, updated_at";

impl Database {
    fn row_to_feature(row: &Row) -> SqliteResult<Feature> {
        let status: String = row.get(4)?;
        let priority: String = row.get(5)?;
        let created_at: String = row.get(9)?;
        let updated_at: String = row.get(10)?;
        Ok(Feature {
            id: row.get(0)?,
            workspace_id: row.get(1)?,
            title: row.get(2)?,
            brief: row.get(3)?,
            status: parse_enum(4, &status)?,
            priority: parse_enum(5, &priority)?,
            assignee_id: row.get(6)?,
            created_by_id: row.get(7)?,
            deleted: row.get::<_, i64>(8)? != 0,
            created_at: parse_ts(9, &created_at)?,
            updated_at: parse_ts(10, &updated_at)?,
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub fn create_feature(
        &self,
        workspace_id: &str,
        title: &str,
        brief: Option<&str>,
        status: FeatureStatus,
        priority: Priority,
        assignee_id: Option<&str>,
        created_by_id: &str,
    ) -> SqliteResult<Feature> {
        let id = new_id();
        {
            let conn = self.conn.lock();
            let now = now_ts();
            conn.execute(
                "INSERT INTO features (id, workspace_id, title, brief, status, priority, assignee_id,
                 created_by_id, deleted, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, ?9, ?9)",
                rusqlite::params![
                    &id,
                    workspace_id,
                    title,
                    brief,
                    status.as_ref(),
                    priority.as_ref(),
                    assignee_id,
                    created_by_id,
                    &now
                ],
            )?;
        }
        self.get_feature(&id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)
    }

    pub fn get_feature(&self, id: &str) -> SqliteResult<Option<Feature>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("SELECT {} FROM features WHERE id = ?1 AND deleted = 0", FEATURE_COLUMNS),
            [id],
            Self::row_to_feature,
        )
        .optional()
    }

    pub fn list_features(&self, workspace_id: &str) -> SqliteResult<Vec<Feature>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM features WHERE workspace_id = ?1 AND deleted = 0
             ORDER BY created_at DESC, rowid DESC",
            FEATURE_COLUMNS
        ))?;
        let features = stmt
            .query_map([workspace_id], Self::row_to_feature)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(features)
    }

    pub fn update_feature(&self, id: &str, update: &UpdateFeatureRequest) -> SqliteResult<Option<Feature>> {
        {
            let conn = self.conn.lock();
            let now = now_ts();

            if let Some(title) = &update.title {
                conn.execute(
                    "UPDATE features SET title = ?1, updated_at = ?2 WHERE id = ?3 AND deleted = 0",
                    rusqlite::params![title, &now, id],
                )?;
            }
            if let Some(brief) = &update.brief {
                conn.execute(
                    "UPDATE features SET brief = ?1, updated_at = ?2 WHERE id = ?3 AND deleted = 0",
                    rusqlite::params![brief, &now, id],
                )?;
            }
            if let Some(status) = update.status {
                conn.execute(
                    "UPDATE features SET status = ?1, updated_at = ?2 WHERE id = ?3 AND deleted = 0",
                    rusqlite::params![status.as_ref(), &now, id],
                )?;
            }
            if let Some(priority) = update.priority {
                conn.execute(
                    "UPDATE features SET priority = ?1, updated_at = ?2 WHERE id = ?3 AND deleted = 0",
                    rusqlite::params![priority.as_ref(), &now, id],
                )?;
            }
            if let Some(assignee_id) = &update.assignee_id {
                conn.execute(
                    "UPDATE features SET assignee_id = ?1, updated_at = ?2 WHERE id = ?3 AND deleted = 0",
                    rusqlite::params![assignee_id, &now, id],
                )?;
            }
        }
        self.get_feature(id)
    }

    pub fn soft_delete_feature(&self, id: &str) -> SqliteResult<bool> {
        let conn = self.conn.lock();
        let rows = conn.execute(
            "UPDATE features SET deleted = 1, updated_at = ?1 WHERE id = ?2 AND deleted = 0",
            rusqlite::params![now_ts(), id],
        )?;
        Ok(rows > 0)
    }
}

//! Workspace database operations

use chrono::Utc;
use rusqlite::{OptionalExtension, Result as SqliteResult, Row};

use crate::db::{new_id, now_ts, parse_enum, parse_opt_ts, parse_ts};
use crate::models::{Workspace, WorkspaceRole};
use super::super::Database;

const WORKSPACE_COLUMNS: &str =
    "w.id, w.name, w.slug, w.description, w.owner_id, w.deleted, w.deleted_at, w.original_slug, w.created_at, w.updated_at";

impl Database {
    fn row_to_workspace(row: &Row) -> SqliteResult<Workspace> {
        let created_at: String = row.get(8)?;
        let updated_at: String = row.get(9)?;
        Ok(Workspace {
            id: row.get(0)?,
            name: row.get(1)?,
            slug: row.get(2)?,
            description: row.get(3)?,
            owner_id: row.get(4)?,
            deleted: row.get::<_, i64>(5)? != 0,
            deleted_at: parse_opt_ts(6, row.get(6)?)?,
            original_slug: row.get(7)?,
            created_at: parse_ts(8, &created_at)?,
            updated_at: parse_ts(9, &updated_at)?,
        })
    }

    pub fn create_workspace(
        &self,
        name: &str,
        slug: &str,
        description: Option<&str>,
        owner_id: &str,
    ) -> SqliteResult<Workspace> {
        let id = new_id();
        {
            let conn = self.conn.lock();
            let now = now_ts();
            conn.execute(
                "INSERT INTO workspaces (id, name, slug, description, owner_id, deleted, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?6)",
                rusqlite::params![&id, name, slug, description, owner_id, &now],
            )?;
        }
        self.get_workspace(&id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)
    }

    /// Get a non-deleted workspace by id
    pub fn get_workspace(&self, id: &str) -> SqliteResult<Option<Workspace>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("SELECT {} FROM workspaces w WHERE w.id = ?1 AND w.deleted = 0", WORKSPACE_COLUMNS),
            [id],
            Self::row_to_workspace,
        )
        .optional()
    }

    /// Get a non-deleted workspace by slug
    pub fn get_workspace_by_slug(&self, slug: &str) -> SqliteResult<Option<Workspace>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("SELECT {} FROM workspaces w WHERE w.slug = ?1 AND w.deleted = 0", WORKSPACE_COLUMNS),
            [slug],
            Self::row_to_workspace,
        )
        .optional()
    }

    /// Whether a slug is taken by any workspace, deleted or not
    pub fn slug_exists(&self, slug: &str) -> SqliteResult<bool> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM workspaces WHERE slug = ?1",
            [slug],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Workspaces the user owns or is an active member of, with role and member count
    pub fn list_workspaces_for_user(
        &self,
        user_id: &str,
    ) -> SqliteResult<Vec<(Workspace, WorkspaceRole, i64)>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {cols},
                    CASE WHEN w.owner_id = ?1 THEN 'OWNER' ELSE m.role END AS user_role,
                    (SELECT COUNT(*) FROM workspace_members am
                       WHERE am.workspace_id = w.id AND am.left_at IS NULL) + 1 AS member_count
             FROM workspaces w
             LEFT JOIN workspace_members m
               ON m.workspace_id = w.id AND m.user_id = ?1 AND m.left_at IS NULL
             WHERE w.deleted = 0 AND (w.owner_id = ?1 OR m.id IS NOT NULL)
             ORDER BY w.name COLLATE NOCASE",
            cols = WORKSPACE_COLUMNS
        ))?;

        let rows = stmt
            .query_map([user_id], |row| {
                let workspace = Self::row_to_workspace(row)?;
                let role: String = row.get(10)?;
                Ok((workspace, parse_enum(10, &role)?, row.get(11)?))
            })?
            .filter_map(|r| r.ok())
            .collect();

        Ok(rows)
    }

    pub fn update_workspace(
        &self,
        id: &str,
        name: Option<&str>,
        slug: Option<&str>,
        description: Option<&str>,
    ) -> SqliteResult<Option<Workspace>> {
        {
            let conn = self.conn.lock();
            conn.execute(
                "UPDATE workspaces SET name = COALESCE(?1, name), slug = COALESCE(?2, slug),
                 description = COALESCE(?3, description), updated_at = ?4
                 WHERE id = ?5 AND deleted = 0",
                rusqlite::params![name, slug, description, now_ts(), id],
            )?;
        }
        self.get_workspace(id)
    }

    /// Soft delete: flag the row and rename its slug so the slug can be reused
    pub fn soft_delete_workspace(&self, id: &str) -> SqliteResult<bool> {
        let conn = self.conn.lock();
        let now = Utc::now();
        let rows = conn.execute(
            "UPDATE workspaces SET deleted = 1, deleted_at = ?1, original_slug = slug,
             slug = slug || '-deleted-' || ?2, updated_at = ?1
             WHERE id = ?3 AND deleted = 0",
            rusqlite::params![crate::db::format_ts(now), now.timestamp_millis(), id],
        )?;
        Ok(rows > 0)
    }

    pub fn set_workspace_stakwork_key(&self, id: &str, encrypted_key: &str) -> SqliteResult<bool> {
        let conn = self.conn.lock();
        let rows = conn.execute(
            "UPDATE workspaces SET stakwork_api_key = ?1, updated_at = ?2 WHERE id = ?3 AND deleted = 0",
            rusqlite::params![encrypted_key, now_ts(), id],
        )?;
        Ok(rows > 0)
    }

    pub fn get_workspace_stakwork_key(&self, id: &str) -> SqliteResult<Option<String>> {
        let conn = self.conn.lock();
        let key: Option<Option<String>> = conn
            .query_row(
                "SELECT stakwork_api_key FROM workspaces WHERE id = ?1 AND deleted = 0",
                [id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(key.flatten())
    }
}

//! Swarm database operations
//!
//! Secret columns (swarm_api_key, pool_api_key) hold encrypted payloads and are only
//! returned through `get_swarm_secrets`.

use rusqlite::{OptionalExtension, Result as SqliteResult, Row};

use crate::db::{new_id, now_ts, parse_enum, parse_ts};
use crate::models::{Swarm, SwarmStatus};
use super::super::Database;

const SWARM_COLUMNS: &str = "id, workspace_id, name, swarm_url, status, pool_name, ingest_ref_id,
     swarm_api_key IS NOT NULL, pool_api_key IS NOT NULL, created_at, updated_at";

/// Encrypted key columns of a swarm
#[derive(Debug, Clone, Default)]
pub struct SwarmSecrets {
    pub swarm_api_key: Option<String>,
    pub pool_api_key: Option<String>,
}

impl Database {
    fn row_to_swarm(row: &Row) -> SqliteResult<Swarm> {
        let status: String = row.get(4)?;
        let created_at: String = row.get(9)?;
        let updated_at: String = row.get(10)?;
        Ok(Swarm {
            id: row.get(0)?,
            workspace_id: row.get(1)?,
            name: row.get(2)?,
            swarm_url: row.get(3)?,
            status: parse_enum(4, &status)?,
            pool_name: row.get(5)?,
            ingest_ref_id: row.get(6)?,
            has_swarm_api_key: row.get(7)?,
            has_pool_api_key: row.get(8)?,
            created_at: parse_ts(9, &created_at)?,
            updated_at: parse_ts(10, &updated_at)?,
        })
    }

    pub fn get_swarm_by_workspace(&self, workspace_id: &str) -> SqliteResult<Option<Swarm>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("SELECT {} FROM swarms WHERE workspace_id = ?1", SWARM_COLUMNS),
            [workspace_id],
            Self::row_to_swarm,
        )
        .optional()
    }

    pub fn get_swarm_by_ingest_ref(&self, ingest_ref_id: &str) -> SqliteResult<Option<Swarm>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("SELECT {} FROM swarms WHERE ingest_ref_id = ?1", SWARM_COLUMNS),
            [ingest_ref_id],
            Self::row_to_swarm,
        )
        .optional()
    }

    /// Create or update the workspace's swarm. Key arguments left as `None` keep the
    /// stored value.
    pub fn upsert_swarm(
        &self,
        workspace_id: &str,
        name: &str,
        swarm_url: &str,
        encrypted_swarm_key: Option<&str>,
        pool_name: Option<&str>,
        encrypted_pool_key: Option<&str>,
    ) -> SqliteResult<Swarm> {
        {
            let conn = self.conn.lock();
            let now = now_ts();
            conn.execute(
                "INSERT INTO swarms (id, workspace_id, name, swarm_url, swarm_api_key, pool_name, pool_api_key,
                 status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
                 ON CONFLICT(workspace_id) DO UPDATE SET
                    name = excluded.name,
                    swarm_url = excluded.swarm_url,
                    swarm_api_key = COALESCE(excluded.swarm_api_key, swarm_api_key),
                    pool_name = COALESCE(excluded.pool_name, pool_name),
                    pool_api_key = COALESCE(excluded.pool_api_key, pool_api_key),
                    updated_at = excluded.updated_at",
                rusqlite::params![
                    new_id(),
                    workspace_id,
                    name,
                    swarm_url,
                    encrypted_swarm_key,
                    pool_name,
                    encrypted_pool_key,
                    SwarmStatus::Active.as_ref(),
                    &now
                ],
            )?;
        }
        self.get_swarm_by_workspace(workspace_id)?
            .ok_or(rusqlite::Error::QueryReturnedNoRows)
    }

    pub fn get_swarm_secrets(&self, swarm_id: &str) -> SqliteResult<SwarmSecrets> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT swarm_api_key, pool_api_key FROM swarms WHERE id = ?1",
            [swarm_id],
            |row| {
                Ok(SwarmSecrets {
                    swarm_api_key: row.get(0)?,
                    pool_api_key: row.get(1)?,
                })
            },
        )
        .optional()
        .map(Option::unwrap_or_default)
    }

    pub fn set_swarm_ingest_ref(&self, swarm_id: &str, ingest_ref_id: &str) -> SqliteResult<bool> {
        let conn = self.conn.lock();
        let rows = conn.execute(
            "UPDATE swarms SET ingest_ref_id = ?1, updated_at = ?2 WHERE id = ?3",
            rusqlite::params![ingest_ref_id, now_ts(), swarm_id],
        )?;
        Ok(rows > 0)
    }
}

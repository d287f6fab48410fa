//! Login provider accounts and encrypted secret maintenance

use rusqlite::{OptionalExtension, Result as SqliteResult};

use crate::crypto::{fields, EncryptionService};
use crate::db::{new_id, now_ts};
use super::super::Database;

pub const GITHUB_PROVIDER: &str = "github";

impl Database {
    /// Insert or refresh a provider account. `encrypted_token` must already be sealed.
    pub fn upsert_account(
        &self,
        user_id: &str,
        provider: &str,
        provider_account_id: &str,
        encrypted_token: &str,
        scope: Option<&str>,
    ) -> SqliteResult<()> {
        let conn = self.conn.lock();
        let now = now_ts();

        let rows = conn.execute(
            "UPDATE accounts SET user_id = ?1, access_token = ?2, scope = ?3, updated_at = ?4
             WHERE provider = ?5 AND provider_account_id = ?6",
            rusqlite::params![user_id, encrypted_token, scope, &now, provider, provider_account_id],
        )?;

        if rows == 0 {
            conn.execute(
                "INSERT INTO accounts (id, user_id, provider, provider_account_id, access_token, scope, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
                rusqlite::params![new_id(), user_id, provider, provider_account_id, encrypted_token, scope, &now],
            )?;
        }

        Ok(())
    }

    /// Stored (encrypted) access token of the user's most recent account for a provider
    pub fn get_account_token(&self, user_id: &str, provider: &str) -> SqliteResult<Option<String>> {
        let conn = self.conn.lock();
        let token: Option<Option<String>> = conn
            .query_row(
                "SELECT access_token FROM accounts WHERE user_id = ?1 AND provider = ?2
                 ORDER BY updated_at DESC LIMIT 1",
                [user_id, provider],
                |row| row.get(0),
            )
            .optional()?;
        Ok(token.flatten())
    }

    /// Re-seal every encrypted column that is not on the active key.
    /// Returns the number of values rewritten.
    pub fn rotate_encrypted_secrets(&self, crypto: &EncryptionService) -> SqliteResult<usize> {
        const TARGETS: &[(&str, &str, &str)] = &[
            ("accounts", "access_token", fields::ACCESS_TOKEN),
            ("swarms", "swarm_api_key", fields::SWARM_API_KEY),
            ("swarms", "pool_api_key", fields::POOL_API_KEY),
            ("workspaces", "stakwork_api_key", fields::STAKWORK_API_KEY),
        ];

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let mut rotated = 0;

        for (table, column, field) in TARGETS {
            let rows: Vec<(String, String)> = {
                let mut stmt = tx.prepare(&format!(
                    "SELECT id, {column} FROM {table} WHERE {column} IS NOT NULL"
                ))?;
                stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                    .filter_map(|r| r.ok())
                    .collect()
            };

            for (id, stored) in rows {
                match crypto.rotate(field, &stored) {
                    Ok(Some(resealed)) => {
                        tx.execute(
                            &format!("UPDATE {table} SET {column} = ?1 WHERE id = ?2"),
                            [&resealed, &id],
                        )?;
                        rotated += 1;
                    }
                    Ok(None) => {}
                    Err(e) => {
                        log::warn!("[CRYPTO] Skipping {}.{} for row {}: {}", table, column, id, e);
                    }
                }
            }
        }

        tx.commit()?;
        Ok(rotated)
    }
}

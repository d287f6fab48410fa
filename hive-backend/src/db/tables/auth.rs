//! Auth session database operations

use chrono::{Duration, Utc};
use rand::RngCore;
use rusqlite::Result as SqliteResult;

use crate::db::{format_ts, now_ts, parse_ts};
use crate::models::{Session, User};
use super::super::Database;

fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

impl Database {
    /// Create a session for a user that expires after `ttl_hours`
    pub fn create_session(&self, user_id: &str, ttl_hours: i64) -> SqliteResult<Session> {
        let conn = self.conn.lock();
        let token = generate_token();
        let created_at = Utc::now();
        let expires_at = created_at + Duration::hours(ttl_hours);

        conn.execute(
            "INSERT INTO auth_sessions (token, user_id, created_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![&token, user_id, format_ts(created_at), format_ts(expires_at)],
        )?;

        Ok(Session {
            id: conn.last_insert_rowid(),
            token,
            user_id: user_id.to_string(),
            created_at,
            expires_at,
        })
    }

    /// Look up a session by token. Expired sessions are deleted and reported as missing.
    pub fn validate_session(&self, token: &str) -> SqliteResult<Option<Session>> {
        let conn = self.conn.lock();

        let mut stmt = conn.prepare(
            "SELECT id, token, user_id, created_at, expires_at FROM auth_sessions WHERE token = ?1",
        )?;

        let session = stmt
            .query_row([token], |row| {
                let created_at: String = row.get(3)?;
                let expires_at: String = row.get(4)?;
                Ok(Session {
                    id: row.get(0)?,
                    token: row.get(1)?,
                    user_id: row.get(2)?,
                    created_at: parse_ts(3, &created_at)?,
                    expires_at: parse_ts(4, &expires_at)?,
                })
            })
            .ok();

        match session {
            Some(session) if session.is_expired() => {
                conn.execute("DELETE FROM auth_sessions WHERE id = ?1", [session.id])?;
                Ok(None)
            }
            other => Ok(other),
        }
    }

    /// Resolve a session token to its (non-deleted) user
    pub fn get_session_user(&self, token: &str) -> SqliteResult<Option<User>> {
        let Some(session) = self.validate_session(token)? else {
            return Ok(None);
        };
        Ok(self.get_user(&session.user_id)?.filter(|u| !u.deleted))
    }

    pub fn delete_session(&self, token: &str) -> SqliteResult<bool> {
        let conn = self.conn.lock();
        let rows = conn.execute("DELETE FROM auth_sessions WHERE token = ?1", [token])?;
        Ok(rows > 0)
    }

    /// Delete every expired session, returning how many were removed
    pub fn purge_expired_sessions(&self) -> SqliteResult<usize> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM auth_sessions WHERE expires_at <= ?1", [now_ts()])
    }
}

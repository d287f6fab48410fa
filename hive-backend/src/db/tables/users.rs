//! User database operations

use rusqlite::{OptionalExtension, Result as SqliteResult, Row};

use crate::db::{new_id, now_ts, parse_ts};
use crate::models::{User, UserProfile};
use super::super::Database;

const USER_COLUMNS: &str =
    "id, name, email, image, github_username, github_id, deleted, created_at, updated_at";

impl Database {
    pub(crate) fn row_to_user(row: &Row) -> SqliteResult<User> {
        let created_at: String = row.get(7)?;
        let updated_at: String = row.get(8)?;
        Ok(User {
            id: row.get(0)?,
            name: row.get(1)?,
            email: row.get(2)?,
            image: row.get(3)?,
            github_username: row.get(4)?,
            github_id: row.get(5)?,
            deleted: row.get::<_, i64>(6)? != 0,
            created_at: parse_ts(7, &created_at)?,
            updated_at: parse_ts(8, &updated_at)?,
        })
    }

    pub fn get_user(&self, id: &str) -> SqliteResult<Option<User>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
            [id],
            Self::row_to_user,
        )
        .optional()
    }

    /// Find an active user by GitHub username (case-insensitive)
    pub fn get_user_by_github_username(&self, username: &str) -> SqliteResult<Option<User>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!(
                "SELECT {} FROM users WHERE github_username = ?1 COLLATE NOCASE AND deleted = 0",
                USER_COLUMNS
            ),
            [username],
            Self::row_to_user,
        )
        .optional()
    }

    /// Create or refresh a user from a GitHub profile, keyed by GitHub id
    pub fn upsert_github_user(&self, profile: &UserProfile) -> SqliteResult<User> {
        let now = now_ts();
        let existing_id: Option<String> = {
            let conn = self.conn.lock();
            conn.query_row(
                "SELECT id FROM users WHERE github_id = ?1",
                [profile.github_id],
                |row| row.get(0),
            )
            .optional()?
        };

        let id = match existing_id {
            Some(id) => {
                let conn = self.conn.lock();
                conn.execute(
                    "UPDATE users SET name = COALESCE(?1, name), email = COALESCE(?2, email),
                     image = COALESCE(?3, image), github_username = COALESCE(?4, github_username),
                     updated_at = ?5 WHERE id = ?6",
                    rusqlite::params![
                        profile.name,
                        profile.email,
                        profile.image,
                        profile.github_username,
                        &now,
                        &id
                    ],
                )?;
                id
            }
            None => {
                let id = new_id();
                let conn = self.conn.lock();
                conn.execute(
                    "INSERT INTO users (id, name, email, image, github_username, github_id, deleted, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7, ?7)",
                    rusqlite::params![
                        &id,
                        profile.name,
                        profile.email,
                        profile.image,
                        profile.github_username,
                        profile.github_id,
                        &now
                    ],
                )?;
                id
            }
        };

        self.get_user(&id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)
    }

    /// Create or reuse the development user `{username}@mock.dev`
    pub fn upsert_mock_user(&self, username: &str) -> SqliteResult<User> {
        let email = format!("{}@mock.dev", username.to_lowercase());
        let now = now_ts();
        {
            let conn = self.conn.lock();
            conn.execute(
                "INSERT OR IGNORE INTO users (id, name, email, github_username, deleted, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, 0, ?5, ?5)",
                rusqlite::params![new_id(), username, &email, username, &now],
            )?;
        }

        let conn = self.conn.lock();
        conn.query_row(
            &format!("SELECT {} FROM users WHERE email = ?1", USER_COLUMNS),
            [&email],
            Self::row_to_user,
        )
    }

    pub fn soft_delete_user(&self, id: &str) -> SqliteResult<bool> {
        let conn = self.conn.lock();
        let rows = conn.execute(
            "UPDATE users SET deleted = 1, updated_at = ?1 WHERE id = ?2",
            rusqlite::params![now_ts(), id],
        )?;
        Ok(rows > 0)
    }
}

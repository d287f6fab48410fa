//! Voice signature database operations

use rusqlite::{OptionalExtension, Result as SqliteResult, Row};

use crate::db::{new_id, now_ts, parse_json, parse_ts};
use crate::models::VoiceSignature;
use super::super::Database;

impl Database {
    fn row_to_voice_signature(row: &Row) -> SqliteResult<VoiceSignature> {
        let embedding: String = row.get(2)?;
        let last_updated: String = row.get(4)?;
        let created_at: String = row.get(5)?;
        Ok(VoiceSignature {
            id: row.get(0)?,
            user_id: row.get(1)?,
            embedding: parse_json(2, &embedding)?,
            sample_count: row.get(3)?,
            last_updated: parse_ts(4, &last_updated)?,
            created_at: parse_ts(5, &created_at)?,
        })
    }

    pub fn get_voice_signature(&self, user_id: &str) -> SqliteResult<Option<VoiceSignature>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, user_id, voice_embedding, sample_count, last_updated, created_at
             FROM voice_signatures WHERE user_id = ?1",
            [user_id],
            Self::row_to_voice_signature,
        )
        .optional()
    }

    /// Insert or replace the user's signature. Without an explicit count the stored
    /// count is incremented (1 for a new signature).
    pub fn upsert_voice_signature(
        &self,
        user_id: &str,
        embedding: &[f32],
        sample_count: Option<i64>,
    ) -> SqliteResult<VoiceSignature> {
        {
            let conn = self.conn.lock();
            let now = now_ts();
            let embedding = serde_json::to_string(embedding).unwrap_or_else(|_| "[]".to_string());
            conn.execute(
                "INSERT INTO voice_signatures (id, user_id, voice_embedding, sample_count, last_updated, created_at)
                 VALUES (?1, ?2, ?3, COALESCE(?4, 1), ?5, ?5)
                 ON CONFLICT(user_id) DO UPDATE SET
                    voice_embedding = excluded.voice_embedding,
                    sample_count = COALESCE(?4, voice_signatures.sample_count + 1),
                    last_updated = excluded.last_updated",
                rusqlite::params![new_id(), user_id, &embedding, sample_count, &now],
            )?;
        }
        self.get_voice_signature(user_id)?
            .ok_or(rusqlite::Error::QueryReturnedNoRows)
    }

    pub fn delete_voice_signature(&self, user_id: &str) -> SqliteResult<bool> {
        let conn = self.conn.lock();
        let rows = conn.execute("DELETE FROM voice_signatures WHERE user_id = ?1", [user_id])?;
        Ok(rows > 0)
    }
}

#[cfg(test)]
mod tests {
    use crate::db::Database;

    #[test]
    fn test_voice_signature_upsert_counts_samples() {
        let db = Database::new(":memory:").unwrap();
        let user = db.upsert_mock_user("speaker").unwrap();

        let first = db.upsert_voice_signature(&user.id, &[0.25, -0.5], None).unwrap();
        assert_eq!(first.sample_count, 1);
        assert_eq!(first.embedding, vec![0.25, -0.5]);

        let second = db.upsert_voice_signature(&user.id, &[0.75], None).unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.sample_count, 2);
        assert_eq!(second.embedding, vec![0.75]);

        let explicit = db.upsert_voice_signature(&user.id, &[0.75], Some(10)).unwrap();
        assert_eq!(explicit.sample_count, 10);

        assert!(db.delete_voice_signature(&user.id).unwrap());
        assert!(!db.delete_voice_signature(&user.id).unwrap());
        assert!(db.get_voice_signature(&user.id).unwrap().is_none());
    }
}

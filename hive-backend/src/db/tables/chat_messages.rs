//! Chat message and artifact database operations

use rusqlite::{OptionalExtension, Result as SqliteResult, Row};
use serde_json::Value;
use std::collections::HashMap;

use crate::db::{new_id, now_ts, parse_enum, parse_json, parse_opt_ts, parse_ts};
use crate::models::{
    Artifact, ArtifactType, ChatMessage, ChatRole, MessageStatus, NewArtifact, PullRequestRecord,
};
use super::super::Database;

const MESSAGE_COLUMNS: &str = "id, task_id, message, role, status, context_tags, created_at, updated_at";

impl Database {
    fn row_to_message(row: &Row) -> SqliteResult<ChatMessage> {
        let role: String = row.get(3)?;
        let status: String = row.get(4)?;
        let context_tags: String = row.get(5)?;
        let created_at: String = row.get(6)?;
        let updated_at: String = row.get(7)?;
        Ok(ChatMessage {
            id: row.get(0)?,
            task_id: row.get(1)?,
            message: row.get(2)?,
            role: parse_enum(3, &role)?,
            status: parse_enum(4, &status)?,
            context_tags: parse_json(5, &context_tags)?,
            artifacts: Vec::new(),
            created_at: parse_ts(6, &created_at)?,
            updated_at: parse_ts(7, &updated_at)?,
        })
    }

    fn row_to_artifact(row: &Row) -> SqliteResult<Artifact> {
        let artifact_type: String = row.get(2)?;
        let content: String = row.get(3)?;
        let created_at: String = row.get(5)?;
        let updated_at: String = row.get(6)?;
        Ok(Artifact {
            id: row.get(0)?,
            message_id: row.get(1)?,
            artifact_type: parse_enum(2, &artifact_type)?,
            content: parse_json(3, &content)?,
            icon: row.get(4)?,
            created_at: parse_ts(5, &created_at)?,
            updated_at: parse_ts(6, &updated_at)?,
        })
    }

    /// Insert a message and its artifacts in one transaction
    pub fn create_chat_message(
        &self,
        task_id: &str,
        message: &str,
        role: ChatRole,
        status: MessageStatus,
        context_tags: &[Value],
        artifacts: &[NewArtifact],
    ) -> SqliteResult<ChatMessage> {
        let id = new_id();
        {
            let mut conn = self.conn.lock();
            let tx = conn.transaction()?;
            let now = now_ts();
            let tags = serde_json::to_string(context_tags).unwrap_or_else(|_| "[]".to_string());

            tx.execute(
                "INSERT INTO chat_messages (id, task_id, message, role, status, context_tags, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
                rusqlite::params![&id, task_id, message, role.as_ref(), status.as_ref(), &tags, &now],
            )?;

            for artifact in artifacts {
                let content = if artifact.content.is_null() {
                    "{}".to_string()
                } else {
                    artifact.content.to_string()
                };
                tx.execute(
                    "INSERT INTO artifacts (id, message_id, type, content, icon, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                    rusqlite::params![
                        new_id(),
                        &id,
                        artifact.artifact_type.as_ref(),
                        &content,
                        &artifact.icon,
                        &now
                    ],
                )?;
            }

            tx.commit()?;
        }
        self.get_chat_message(&id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)
    }

    pub fn get_chat_message(&self, id: &str) -> SqliteResult<Option<ChatMessage>> {
        let conn = self.conn.lock();
        let message = conn
            .query_row(
                &format!("SELECT {} FROM chat_messages WHERE id = ?1", MESSAGE_COLUMNS),
                [id],
                Self::row_to_message,
            )
            .optional()?;

        let Some(mut message) = message else {
            return Ok(None);
        };

        let mut stmt = conn.prepare(
            "SELECT id, message_id, type, content, icon, created_at, updated_at
             FROM artifacts WHERE message_id = ?1 ORDER BY created_at, rowid",
        )?;
        message.artifacts = stmt
            .query_map([id], Self::row_to_artifact)?
            .filter_map(|r| r.ok())
            .collect();

        Ok(Some(message))
    }

    /// All messages of a task with their artifacts, oldest first
    pub fn list_chat_messages(&self, task_id: &str) -> SqliteResult<Vec<ChatMessage>> {
        let conn = self.conn.lock();

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM chat_messages WHERE task_id = ?1 ORDER BY created_at, rowid",
            MESSAGE_COLUMNS
        ))?;
        let mut messages: Vec<ChatMessage> = stmt
            .query_map([task_id], Self::row_to_message)?
            .filter_map(|r| r.ok())
            .collect();

        let mut stmt = conn.prepare(
            "SELECT a.id, a.message_id, a.type, a.content, a.icon, a.created_at, a.updated_at
             FROM artifacts a JOIN chat_messages m ON m.id = a.message_id
             WHERE m.task_id = ?1 ORDER BY a.created_at, a.rowid",
        )?;
        let mut by_message: HashMap<String, Vec<Artifact>> = HashMap::new();
        for artifact in stmt.query_map([task_id], Self::row_to_artifact)?.filter_map(|r| r.ok()) {
            by_message.entry(artifact.message_id.clone()).or_default().push(artifact);
        }

        for message in &mut messages {
            if let Some(artifacts) = by_message.remove(&message.id) {
                message.artifacts = artifacts;
            }
        }

        Ok(messages)
    }

    /// The latest `limit` messages of a task, returned oldest first, without artifacts
    pub fn recent_chat_messages(&self, task_id: &str, limit: usize) -> SqliteResult<Vec<ChatMessage>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM chat_messages WHERE task_id = ?1
             ORDER BY created_at DESC, rowid DESC LIMIT ?2",
            MESSAGE_COLUMNS
        ))?;
        let mut messages: Vec<ChatMessage> = stmt
            .query_map(rusqlite::params![task_id, limit as i64], Self::row_to_message)?
            .filter_map(|r| r.ok())
            .collect();
        messages.reverse();
        Ok(messages)
    }

    pub fn set_message_status(&self, id: &str, status: MessageStatus) -> SqliteResult<bool> {
        let conn = self.conn.lock();
        let rows = conn.execute(
            "UPDATE chat_messages SET status = ?1, updated_at = ?2 WHERE id = ?3",
            rusqlite::params![status.as_ref(), now_ts(), id],
        )?;
        Ok(rows > 0)
    }

    /// Pull request artifacts of a workspace's live tasks created at or after `since`
    pub fn list_pull_request_records(
        &self,
        workspace_id: &str,
        since: &str,
    ) -> SqliteResult<Vec<PullRequestRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT a.content, a.created_at, a.updated_at
             FROM artifacts a
             JOIN chat_messages m ON m.id = a.message_id
             JOIN tasks t ON t.id = m.task_id
             WHERE t.workspace_id = ?1 AND t.deleted = 0 AND a.type = ?2 AND a.created_at >= ?3
             ORDER BY a.created_at, a.rowid",
        )?;

        let records = stmt
            .query_map(
                rusqlite::params![workspace_id, ArtifactType::PullRequest.as_ref(), since],
                |row| {
                    let content: String = row.get(0)?;
                    let created_at: String = row.get(1)?;
                    let updated_at: String = row.get(2)?;
                    let content: Value = parse_json(0, &content)?;
                    let merged_at = content
                        .get("merged_at")
                        .and_then(Value::as_str)
                        .map(str::to_string);
                    Ok(PullRequestRecord {
                        url: content.get("url").and_then(Value::as_str).map(str::to_string),
                        status: content.get("status").and_then(Value::as_str).map(str::to_string),
                        merged_at: parse_opt_ts(0, merged_at).ok().flatten(),
                        created_at: parse_ts(1, &created_at)?,
                        updated_at: parse_ts(2, &updated_at)?,
                    })
                },
            )?
            .filter_map(|r| r.ok())
            .collect();

        Ok(records)
    }
}

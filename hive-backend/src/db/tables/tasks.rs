//! Task database operations

use rusqlite::{OptionalExtension, Result as SqliteResult, Row};

use crate::db::{new_id, now_ts, parse_enum, parse_ts};
use crate::models::{NewTask, Task, TaskStatus, UpdateTaskRequest, WorkflowStatus};
use super::super::Database;

const TASK_COLUMNS: &str = "id, workspace_id, title, description, status, priority, workflow_status,
     assignee_id, repository_id, stakwork_project_id, created_by_id, deleted, created_at, updated_at";

impl Database {
    fn row_to_task(row: &Row) -> SqliteResult<Task> {
        let status: String = row.get(4)?;
        let priority: String = row.get(5)?;
        let workflow_status: String = row.get(6)?;
        let created_at: String = row.get(12)?;
        let updated_at: String = row.get(13)?;
        Ok(Task {
            id: row.get(0)?,
            workspace_id: row.get(1)?,
            title: row.get(2)?,
            description: row.get(3)?,
            status: parse_enum(4, &status)?,
            priority: parse_enum(5, &priority)?,
            workflow_status: parse_enum(6, &workflow_status)?,
            assignee_id: row.get(7)?,
            repository_id: row.get(8)?,
            stakwork_project_id: row.get(9)?,
            created_by_id: row.get(10)?,
            deleted: row.get::<_, i64>(11)? != 0,
            created_at: parse_ts(12, &created_at)?,
            updated_at: parse_ts(13, &updated_at)?,
        })
    }

    pub fn create_task(&self, task: &NewTask) -> SqliteResult<Task> {
        let id = new_id();
        {
            let conn = self.conn.lock();
            let now = now_ts();
            conn.execute(
                "INSERT INTO tasks (id, workspace_id, title, description, status, priority, workflow_status,
                 assignee_id, repository_id, created_by_id, deleted, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 0, ?11, ?11)",
                rusqlite::params![
                    &id,
                    &task.workspace_id,
                    &task.title,
                    &task.description,
                    task.status.as_ref(),
                    task.priority.as_ref(),
                    WorkflowStatus::Pending.as_ref(),
                    &task.assignee_id,
                    &task.repository_id,
                    &task.created_by_id,
                    &now,
                ],
            )?;
        }
        self.get_task(&id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)
    }

    /// Get a non-deleted task
    pub fn get_task(&self, id: &str) -> SqliteResult<Option<Task>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("SELECT {} FROM tasks WHERE id = ?1 AND deleted = 0", TASK_COLUMNS),
            [id],
            Self::row_to_task,
        )
        .optional()
    }

    /// Page through a workspace's tasks, newest first. Returns the page and the total count.
    pub fn list_tasks(
        &self,
        workspace_id: &str,
        status: Option<TaskStatus>,
        page: u32,
        limit: u32,
    ) -> SqliteResult<(Vec<Task>, i64)> {
        let conn = self.conn.lock();
        let status = status.map(|s| s.as_ref().to_string());
        let offset = (page.max(1) as i64 - 1) * limit as i64;

        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM tasks
             WHERE workspace_id = ?1 AND deleted = 0 AND (?2 IS NULL OR status = ?2)",
            rusqlite::params![workspace_id, &status],
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM tasks
             WHERE workspace_id = ?1 AND deleted = 0 AND (?2 IS NULL OR status = ?2)
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?3 OFFSET ?4",
            TASK_COLUMNS
        ))?;

        let tasks = stmt
            .query_map(
                rusqlite::params![workspace_id, &status, limit as i64, offset],
                Self::row_to_task,
            )?
            .filter_map(|r| r.ok())
            .collect();

        Ok((tasks, total))
    }

    /// Apply a partial update atomically. The title is expected to be validated by the caller.
    pub fn update_task(&self, id: &str, update: &UpdateTaskRequest) -> SqliteResult<Option<Task>> {
        {
            let mut conn = self.conn.lock();
            let tx = conn.transaction()?;
            let now = now_ts();

            if let Some(title) = &update.title {
                tx.execute(
                    "UPDATE tasks SET title = ?1, updated_at = ?2 WHERE id = ?3 AND deleted = 0",
                    rusqlite::params![title, &now, id],
                )?;
            }
            if let Some(description) = &update.description {
                tx.execute(
                    "UPDATE tasks SET description = ?1, updated_at = ?2 WHERE id = ?3 AND deleted = 0",
                    rusqlite::params![description, &now, id],
                )?;
            }
            if let Some(status) = update.status {
                tx.execute(
                    "UPDATE tasks SET status = ?1, updated_at = ?2 WHERE id = ?3 AND deleted = 0",
                    rusqlite::params![status.as_ref(), &now, id],
                )?;
            }
            if let Some(priority) = update.priority {
                tx.execute(
                    "UPDATE tasks SET priority = ?1, updated_at = ?2 WHERE id = ?3 AND deleted = 0",
                    rusqlite::params![priority.as_ref(), &now, id],
                )?;
            }
            if let Some(workflow_status) = update.workflow_status {
                tx.execute(
                    "UPDATE tasks SET workflow_status = ?1, updated_at = ?2 WHERE id = ?3 AND deleted = 0",
                    rusqlite::params![workflow_status.as_ref(), &now, id],
                )?;
            }
            if let Some(assignee_id) = &update.assignee_id {
                tx.execute(
                    "UPDATE tasks SET assignee_id = ?1, updated_at = ?2 WHERE id = ?3 AND deleted = 0",
                    rusqlite::params![assignee_id, &now, id],
                )?;
            }
            tx.commit()?;
        }
        self.get_task(id)
    }

    pub fn set_task_workflow(
        &self,
        id: &str,
        workflow_status: WorkflowStatus,
        stakwork_project_id: Option<i64>,
    ) -> SqliteResult<bool> {
        let conn = self.conn.lock();
        let rows = conn.execute(
            "UPDATE tasks SET workflow_status = ?1,
             stakwork_project_id = COALESCE(?2, stakwork_project_id), updated_at = ?3
             WHERE id = ?4 AND deleted = 0",
            rusqlite::params![workflow_status.as_ref(), stakwork_project_id, now_ts(), id],
        )?;
        Ok(rows > 0)
    }

    pub fn soft_delete_task(&self, id: &str) -> SqliteResult<bool> {
        let conn = self.conn.lock();
        let now = now_ts();
        let rows = conn.execute(
            "UPDATE tasks SET deleted = 1, deleted_at = ?1, updated_at = ?1 WHERE id = ?2 AND deleted = 0",
            rusqlite::params![&now, id],
        )?;
        Ok(rows > 0)
    }
}

#[cfg(test)]
mod tests {
    use crate::db::Database;
    use crate::models::*;

    fn setup() -> (Database, Workspace, User) {
        let db = Database::new(":memory:").unwrap();
        let owner = db.upsert_mock_user("owner").unwrap();
        let ws = db.create_workspace("Acme", "acme", None, &owner.id).unwrap();
        (db, ws, owner)
    }

    fn new_task(ws: &Workspace, user: &User, title: &str, status: TaskStatus) -> NewTask {
        NewTask {
            workspace_id: ws.id.clone(),
            title: title.to_string(),
            description: None,
            status,
            priority: Priority::default(),
            assignee_id: None,
            repository_id: None,
            created_by_id: user.id.clone(),
        }
    }

    #[test]
    fn test_create_and_get_task() {
        let (db, ws, owner) = setup();
        let task = db.create_task(&new_task(&ws, &owner, "Write docs", TaskStatus::Todo)).unwrap();

        assert_eq!(task.title, "Write docs");
        assert_eq!(task.priority, Priority::Medium);
        assert_eq!(task.workflow_status, WorkflowStatus::Pending);
        assert!(task.stakwork_project_id.is_none());
        assert_eq!(db.get_task(&task.id).unwrap().unwrap().id, task.id);
    }

    #[test]
    fn test_list_tasks_paginates_and_filters() {
        let (db, ws, owner) = setup();
        for i in 0..5 {
            db.create_task(&new_task(&ws, &owner, &format!("t{}", i), TaskStatus::Todo)).unwrap();
        }
        db.create_task(&new_task(&ws, &owner, "done", TaskStatus::Done)).unwrap();

        let (page1, total) = db.list_tasks(&ws.id, None, 1, 4).unwrap();
        assert_eq!(total, 6);
        assert_eq!(page1.len(), 4);
        assert_eq!(page1[0].title, "done");

        let (page2, _) = db.list_tasks(&ws.id, None, 2, 4).unwrap();
        assert_eq!(page2.len(), 2);

        let (done, total) = db.list_tasks(&ws.id, Some(TaskStatus::Done), 1, 20).unwrap();
        assert_eq!(total, 1);
        assert_eq!(done[0].status, TaskStatus::Done);
    }

    #[test]
    fn test_update_and_soft_delete() {
        let (db, ws, owner) = setup();
        let task = db.create_task(&new_task(&ws, &owner, "t", TaskStatus::Todo)).unwrap();

        let update = UpdateTaskRequest {
            title: Some("renamed".to_string()),
            description: Some(Some("details".to_string())),
            status: Some(TaskStatus::InProgress),
            assignee_id: Some(Some(owner.id.clone())),
            ..Default::default()
        };
        let updated = db.update_task(&task.id, &update).unwrap().unwrap();
        assert_eq!(updated.title, "renamed");
        assert_eq!(updated.description.as_deref(), Some("details"));
        assert_eq!(updated.assignee_id.as_deref(), Some(owner.id.as_str()));

        let clear = UpdateTaskRequest {
            assignee_id: Some(None),
            ..Default::default()
        };
        assert!(db.update_task(&task.id, &clear).unwrap().unwrap().assignee_id.is_none());

        assert!(db.set_task_workflow(&task.id, WorkflowStatus::InProgress, Some(42)).unwrap());
        let task_row = db.get_task(&task.id).unwrap().unwrap();
        assert_eq!(task_row.stakwork_project_id, Some(42));

        assert!(db.soft_delete_task(&task.id).unwrap());
        assert!(db.get_task(&task.id).unwrap().is_none());
        assert_eq!(db.list_tasks(&ws.id, None, 1, 20).unwrap().1, 0);
    }

    #[test]
    fn test_failed_update_changes_nothing() {
        let (db, ws, owner) = setup();
        let task = db.create_task(&new_task(&ws, &owner, "original", TaskStatus::Todo)).unwrap();

        // Title is written first; the unknown assignee then violates the foreign key
        let update = UpdateTaskRequest {
            title: Some("renamed".to_string()),
            status: Some(TaskStatus::Done),
            assignee_id: Some(Some("no-such-user".to_string())),
            ..Default::default()
        };
        assert!(db.update_task(&task.id, &update).is_err());

        let stored = db.get_task(&task.id).unwrap().unwrap();
        assert_eq!(stored.title, "original");
        assert_eq!(stored.status, TaskStatus::Todo);
        assert!(stored.assignee_id.is_none());
    }
}

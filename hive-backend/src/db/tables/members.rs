//! Workspace membership database operations

use rusqlite::{OptionalExtension, Result as SqliteResult, Row};

use crate::db::{new_id, now_ts, parse_enum, parse_opt_ts, parse_ts};
use crate::models::{User, WorkspaceMember, WorkspaceRole};
use super::super::Database;

/// Active member joined with the member's user row
pub type MemberWithUser = (WorkspaceMember, User);

const MEMBER_COLUMNS: &str = "m.id, m.workspace_id, m.user_id, m.role, m.joined_at, m.left_at";

impl Database {
    fn row_to_member(row: &Row) -> SqliteResult<WorkspaceMember> {
        let role: String = row.get(3)?;
        let joined_at: String = row.get(4)?;
        Ok(WorkspaceMember {
            id: row.get(0)?,
            workspace_id: row.get(1)?,
            user_id: row.get(2)?,
            role: parse_enum(3, &role)?,
            joined_at: parse_ts(4, &joined_at)?,
            left_at: parse_opt_ts(5, row.get(5)?)?,
        })
    }

    /// Membership row (active or not) for a user in a workspace
    pub fn get_membership(&self, workspace_id: &str, user_id: &str) -> SqliteResult<Option<WorkspaceMember>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!(
                "SELECT {} FROM workspace_members m WHERE m.workspace_id = ?1 AND m.user_id = ?2",
                MEMBER_COLUMNS
            ),
            [workspace_id, user_id],
            Self::row_to_member,
        )
        .optional()
    }

    /// Active members with their users, oldest first. The owner is not included.
    pub fn list_members(&self, workspace_id: &str) -> SqliteResult<Vec<MemberWithUser>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {}, u.id, u.name, u.email, u.image, u.github_username, u.github_id, u.deleted, u.created_at, u.updated_at
             FROM workspace_members m JOIN users u ON u.id = m.user_id
             WHERE m.workspace_id = ?1 AND m.left_at IS NULL AND u.deleted = 0
             ORDER BY m.joined_at",
            MEMBER_COLUMNS
        ))?;

        let members = stmt
            .query_map([workspace_id], |row| {
                let member = Self::row_to_member(row)?;
                let created_at: String = row.get(13)?;
                let updated_at: String = row.get(14)?;
                let user = User {
                    id: row.get(6)?,
                    name: row.get(7)?,
                    email: row.get(8)?,
                    image: row.get(9)?,
                    github_username: row.get(10)?,
                    github_id: row.get(11)?,
                    deleted: row.get::<_, i64>(12)? != 0,
                    created_at: parse_ts(13, &created_at)?,
                    updated_at: parse_ts(14, &updated_at)?,
                };
                Ok((member, user))
            })?
            .filter_map(|r| r.ok())
            .collect();

        Ok(members)
    }

    /// Add a member, or re-activate one who left, with the given role
    pub fn add_member(
        &self,
        workspace_id: &str,
        user_id: &str,
        role: WorkspaceRole,
    ) -> SqliteResult<WorkspaceMember> {
        {
            let conn = self.conn.lock();
            let now = now_ts();
            let reactivated = conn.execute(
                "UPDATE workspace_members SET role = ?1, joined_at = ?2, left_at = NULL
                 WHERE workspace_id = ?3 AND user_id = ?4",
                rusqlite::params![role.as_ref(), &now, workspace_id, user_id],
            )?;
            if reactivated == 0 {
                conn.execute(
                    "INSERT INTO workspace_members (id, workspace_id, user_id, role, joined_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    rusqlite::params![new_id(), workspace_id, user_id, role.as_ref(), &now],
                )?;
            }
        }
        self.get_membership(workspace_id, user_id)?
            .ok_or(rusqlite::Error::QueryReturnedNoRows)
    }

    pub fn update_member_role(
        &self,
        workspace_id: &str,
        user_id: &str,
        role: WorkspaceRole,
    ) -> SqliteResult<Option<WorkspaceMember>> {
        let rows = {
            let conn = self.conn.lock();
            conn.execute(
                "UPDATE workspace_members SET role = ?1
                 WHERE workspace_id = ?2 AND user_id = ?3 AND left_at IS NULL",
                rusqlite::params![role.as_ref(), workspace_id, user_id],
            )?
        };
        if rows == 0 {
            return Ok(None);
        }
        self.get_membership(workspace_id, user_id)
    }

    /// Mark a member as having left. Returns false when no active membership exists.
    pub fn remove_member(&self, workspace_id: &str, user_id: &str) -> SqliteResult<bool> {
        let conn = self.conn.lock();
        let rows = conn.execute(
            "UPDATE workspace_members SET left_at = ?1
             WHERE workspace_id = ?2 AND user_id = ?3 AND left_at IS NULL",
            rusqlite::params![now_ts(), workspace_id, user_id],
        )?;
        Ok(rows > 0)
    }
}

#[cfg(test)]
mod tests {
    use crate::db::Database;
    use crate::models::WorkspaceRole;

    #[test]
    fn test_member_lifecycle() {
        let db = Database::new(":memory:").unwrap();
        let owner = db.upsert_mock_user("owner").unwrap();
        let dev = db.upsert_mock_user("dev").unwrap();
        let ws = db.create_workspace("Acme", "acme", None, &owner.id).unwrap();

        let member = db.add_member(&ws.id, &dev.id, WorkspaceRole::Viewer).unwrap();
        assert_eq!(member.role, WorkspaceRole::Viewer);
        assert!(member.left_at.is_none());

        let updated = db.update_member_role(&ws.id, &dev.id, WorkspaceRole::Pm).unwrap().unwrap();
        assert_eq!(updated.role, WorkspaceRole::Pm);

        assert!(db.remove_member(&ws.id, &dev.id).unwrap());
        assert!(!db.remove_member(&ws.id, &dev.id).unwrap());
        assert!(db.list_members(&ws.id).unwrap().is_empty());
        assert!(db.update_member_role(&ws.id, &dev.id, WorkspaceRole::Admin).unwrap().is_none());

        let back = db.add_member(&ws.id, &dev.id, WorkspaceRole::Developer).unwrap();
        assert_eq!(back.id, member.id);
        assert!(back.left_at.is_none());

        let members = db.list_members(&ws.id).unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].1.id, dev.id);
    }
}

//! Workspace role resolution shared by every workspace-scoped controller

use actix_web::HttpResponse;

use crate::db::Database;
use crate::models::{Workspace, WorkspaceRole};

#[derive(Debug, Clone)]
pub struct WorkspaceAccess {
    pub workspace: Workspace,
    pub role: WorkspaceRole,
}

impl WorkspaceAccess {
    pub fn is_owner(&self) -> bool {
        self.role == WorkspaceRole::Owner
    }
}

#[derive(Debug)]
pub enum AccessError {
    NotFound,
    Forbidden,
    Database(rusqlite::Error),
}

impl From<rusqlite::Error> for AccessError {
    fn from(e: rusqlite::Error) -> Self {
        AccessError::Database(e)
    }
}

impl AccessError {
    pub fn into_response(self) -> HttpResponse {
        match self {
            AccessError::NotFound => HttpResponse::NotFound().json(serde_json::json!({
                "error": "Workspace not found"
            })),
            AccessError::Forbidden => HttpResponse::Forbidden().json(serde_json::json!({
                "error": "Access denied"
            })),
            AccessError::Database(e) => {
                log::error!("Workspace access lookup failed: {}", e);
                HttpResponse::InternalServerError().json(serde_json::json!({
                    "error": "Internal server error"
                }))
            }
        }
    }
}

/// Which capability a handler needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Read,
    Write,
    Admin,
}

impl Permission {
    fn allows(self, role: WorkspaceRole) -> bool {
        match self {
            Permission::Read => role.can_read(),
            Permission::Write => role.can_write(),
            Permission::Admin => role.can_admin(),
        }
    }
}

/// Resolve the caller's role in a workspace addressed by id or slug.
/// Deleted workspaces and non-members are `NotFound`.
pub fn resolve_workspace_access(
    db: &Database,
    workspace_ref: &str,
    user_id: &str,
) -> Result<WorkspaceAccess, AccessError> {
    let workspace = match db.get_workspace(workspace_ref)? {
        Some(ws) => ws,
        None => db
            .get_workspace_by_slug(workspace_ref)?
            .ok_or(AccessError::NotFound)?,
    };

    if workspace.owner_id == user_id {
        return Ok(WorkspaceAccess {
            workspace,
            role: WorkspaceRole::Owner,
        });
    }

    match db.get_membership(&workspace.id, user_id)? {
        Some(member) if member.left_at.is_none() => Ok(WorkspaceAccess {
            workspace,
            role: member.role,
        }),
        _ => Err(AccessError::NotFound),
    }
}

/// Resolve access and check the permission. Non-members get 404, members lacking the
/// permission get 403.
pub fn require_workspace(
    db: &Database,
    workspace_ref: &str,
    user_id: &str,
    permission: Permission,
) -> Result<WorkspaceAccess, HttpResponse> {
    let access = resolve_workspace_access(db, workspace_ref, user_id).map_err(AccessError::into_response)?;
    if permission.allows(access.role) {
        Ok(access)
    } else {
        Err(AccessError::Forbidden.into_response())
    }
}

/// Variant for resources addressed by their own id: the workspace is known to exist,
/// so lack of membership is 403 rather than 404.
pub fn require_resource_workspace(
    db: &Database,
    workspace_id: &str,
    user_id: &str,
    permission: Permission,
) -> Result<WorkspaceAccess, HttpResponse> {
    match resolve_workspace_access(db, workspace_id, user_id) {
        Ok(access) if permission.allows(access.role) => Ok(access),
        Ok(_) | Err(AccessError::NotFound) => Err(AccessError::Forbidden.into_response()),
        Err(e) => Err(e.into_response()),
    }
}

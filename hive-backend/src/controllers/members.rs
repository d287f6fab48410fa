use actix_web::{http::StatusCode, web, HttpRequest, HttpResponse, Responder};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{db_error, error_response};
use crate::middleware::{require_user, require_workspace, Permission, WorkspaceAccess};
use crate::models::{UserSummary, WorkspaceMember, WorkspaceRole};
use crate::AppState;

#[derive(Deserialize)]
pub struct AddMemberRequest {
    github_username: String,
    role: WorkspaceRole,
}

#[derive(Deserialize)]
pub struct UpdateMemberRequest {
    role: WorkspaceRole,
}

#[derive(Serialize)]
struct MemberResponse {
    user_id: String,
    role: WorkspaceRole,
    joined_at: DateTime<Utc>,
    user: UserSummary,
}

impl MemberResponse {
    fn new(member: WorkspaceMember, user: UserSummary) -> Self {
        Self {
            user_id: member.user_id,
            role: member.role,
            joined_at: member.joined_at,
            user,
        }
    }
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/api/workspaces/{slug}/members")
            .route(web::get().to(list_members))
            .route(web::post().to(add_member)),
    );
    cfg.service(
        web::resource("/api/workspaces/{slug}/members/{user_id}")
            .route(web::patch().to(update_member))
            .route(web::delete().to(remove_member)),
    );
}

fn authorize(
    state: &AppState,
    req: &HttpRequest,
    slug: &str,
    permission: Permission,
) -> Result<WorkspaceAccess, HttpResponse> {
    let user = require_user(&state.db, req)?;
    require_workspace(&state.db, slug, &user.id, permission)
}

async fn list_members(state: web::Data<AppState>, req: HttpRequest, path: web::Path<String>) -> impl Responder {
    let access = match authorize(&state, &req, &path, Permission::Read) {
        Ok(a) => a,
        Err(resp) => return resp,
    };

    let owner = match state.db.get_user(&access.workspace.owner_id) {
        Ok(Some(u)) => u,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "Workspace owner not found"),
        Err(e) => return db_error("Failed to load workspace owner", e),
    };
    let members = match state.db.list_members(&access.workspace.id) {
        Ok(m) => m,
        Err(e) => return db_error("Failed to list members", e),
    };

    let mut response = Vec::with_capacity(members.len() + 1);
    response.push(MemberResponse {
        user_id: owner.id.clone(),
        role: WorkspaceRole::Owner,
        joined_at: access.workspace.created_at,
        user: UserSummary::from(&owner),
    });
    response.extend(
        members
            .into_iter()
            .map(|(member, user)| MemberResponse::new(member, UserSummary::from(&user))),
    );

    HttpResponse::Ok().json(serde_json::json!({ "members": response }))
}

async fn add_member(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
    body: web::Json<AddMemberRequest>,
) -> impl Responder {
    let access = match authorize(&state, &req, &path, Permission::Admin) {
        Ok(a) => a,
        Err(resp) => return resp,
    };

    if !body.role.is_assignable() {
        return error_response(StatusCode::BAD_REQUEST, "Invalid role");
    }

    let user = match state.db.get_user_by_github_username(body.github_username.trim()) {
        Ok(Some(u)) => u,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "User not found"),
        Err(e) => return db_error("Failed to look up user", e),
    };

    if user.id == access.workspace.owner_id {
        return error_response(StatusCode::CONFLICT, "User is already a member of this workspace");
    }
    match state.db.get_membership(&access.workspace.id, &user.id) {
        Ok(Some(m)) if m.left_at.is_none() => {
            return error_response(StatusCode::CONFLICT, "User is already a member of this workspace");
        }
        Ok(_) => {}
        Err(e) => return db_error("Failed to look up membership", e),
    }

    match state.db.add_member(&access.workspace.id, &user.id, body.role) {
        Ok(member) => {
            log::info!(
                "Added {} to workspace '{}' as {}",
                user.id,
                access.workspace.slug,
                member.role
            );
            HttpResponse::Created().json(serde_json::json!({
                "member": MemberResponse::new(member, UserSummary::from(&user))
            }))
        }
        Err(e) => db_error("Failed to add member", e),
    }
}

async fn update_member(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<(String, String)>,
    body: web::Json<UpdateMemberRequest>,
) -> impl Responder {
    let (slug, user_id) = path.into_inner();
    let access = match authorize(&state, &req, &slug, Permission::Admin) {
        Ok(a) => a,
        Err(resp) => return resp,
    };

    if user_id == access.workspace.owner_id {
        return error_response(StatusCode::BAD_REQUEST, "Cannot change the workspace owner's role");
    }
    if !body.role.is_assignable() {
        return error_response(StatusCode::BAD_REQUEST, "Invalid role");
    }

    let member = match state.db.update_member_role(&access.workspace.id, &user_id, body.role) {
        Ok(Some(m)) => m,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "Member not found"),
        Err(e) => return db_error("Failed to update member role", e),
    };
    match state.db.get_user(&user_id) {
        Ok(Some(user)) => HttpResponse::Ok().json(serde_json::json!({
            "member": MemberResponse::new(member, UserSummary::from(&user))
        })),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "Member not found"),
        Err(e) => db_error("Failed to load member", e),
    }
}

async fn remove_member(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<(String, String)>,
) -> impl Responder {
    let (slug, user_id) = path.into_inner();
    let access = match authorize(&state, &req, &slug, Permission::Admin) {
        Ok(a) => a,
        Err(resp) => return resp,
    };

    if user_id == access.workspace.owner_id {
        return error_response(StatusCode::BAD_REQUEST, "Cannot remove the workspace owner");
    }

    match state.db.remove_member(&access.workspace.id, &user_id) {
        Ok(true) => HttpResponse::Ok().json(serde_json::json!({ "success": true })),
        Ok(false) => error_response(StatusCode::NOT_FOUND, "Member not found"),
        Err(e) => db_error("Failed to remove member", e),
    }
}

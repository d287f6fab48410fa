use actix_web::{http::StatusCode, web, HttpRequest, HttpResponse, Responder};

use super::{db_error, error_response};
use crate::integrations::github::parse_repository_url;
use crate::middleware::{require_user, require_workspace, Permission};
use crate::models::CreateRepositoryRequest;
use crate::AppState;

const DEFAULT_BRANCH: &str = "main";

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/api/workspaces/{slug}/repositories")
            .route(web::get().to(list_repositories))
            .route(web::post().to(create_repository)),
    );
}

async fn list_repositories(state: web::Data<AppState>, req: HttpRequest, path: web::Path<String>) -> impl Responder {
    let user = match require_user(&state.db, &req) {
        Ok(u) => u,
        Err(resp) => return resp,
    };
    let access = match require_workspace(&state.db, &path, &user.id, Permission::Read) {
        Ok(a) => a,
        Err(resp) => return resp,
    };

    match state.db.list_repositories(&access.workspace.id) {
        Ok(repositories) => HttpResponse::Ok().json(serde_json::json!({ "repositories": repositories })),
        Err(e) => db_error("Failed to list repositories", e),
    }
}

async fn create_repository(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
    body: web::Json<CreateRepositoryRequest>,
) -> impl Responder {
    let user = match require_user(&state.db, &req) {
        Ok(u) => u,
        Err(resp) => return resp,
    };
    let access = match require_workspace(&state.db, &path, &user.id, Permission::Admin) {
        Ok(a) => a,
        Err(resp) => return resp,
    };

    let (owner, repo) = match parse_repository_url(&body.repository_url) {
        Ok(parts) => parts,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &e.to_string()),
    };
    // Canonical form, so the same repository pasted two ways is one row
    let url = format!("https://github.com/{}/{}", owner, repo);
    let name = body
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or(repo.as_str());
    let branch = body
        .branch
        .as_deref()
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .unwrap_or(DEFAULT_BRANCH);

    match state.db.create_repository(&access.workspace.id, name, &url, branch) {
        Ok(Some(repository)) => HttpResponse::Created().json(serde_json::json!({ "repository": repository })),
        Ok(None) => error_response(
            StatusCode::CONFLICT,
            "Repository already exists in this workspace",
        ),
        Err(e) => db_error("Failed to create repository", e),
    }
}

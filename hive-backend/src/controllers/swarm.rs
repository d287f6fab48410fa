use actix_web::{http::StatusCode, web, HttpRequest, HttpResponse, Responder};
use serde::Deserialize;

use super::{db_error, error_response};
use crate::crypto::fields;
use crate::integrations::swarm::{derive_service_url, validate_jarvis_endpoint, DEFAULT_JARVIS_ENDPOINT};
use crate::integrations::IntegrationError;
use crate::middleware::{require_user, require_workspace, Permission, WorkspaceAccess};
use crate::models::{Swarm, UpsertSwarmRequest};
use crate::AppState;

const DEFAULT_SEARCH_LIMIT: u32 = 25;
const MAX_SEARCH_LIMIT: u32 = 100;

#[derive(Deserialize)]
pub struct JarvisNodesQuery {
    workspace_id: String,
    endpoint: Option<String>,
}

#[derive(Deserialize)]
pub struct JarvisSearchRequest {
    workspace_id: String,
    query: String,
    limit: Option<u32>,
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/api/workspaces/{slug}/swarm")
            .route(web::get().to(get_swarm))
            .route(web::put().to(upsert_swarm)),
    );
    cfg.service(web::resource("/api/swarm/jarvis/nodes").route(web::get().to(jarvis_nodes)));
    cfg.service(web::resource("/api/swarm/jarvis/search").route(web::post().to(jarvis_search)));
}

fn swarm_failure(status: StatusCode, message: &str) -> HttpResponse {
    HttpResponse::build(status).json(serde_json::json!({
        "success": false,
        "message": message
    }))
}

/// The workspace's swarm, or the 404 to return
pub(crate) fn load_swarm(state: &AppState, workspace_id: &str) -> Result<Swarm, HttpResponse> {
    match state.db.get_swarm_by_workspace(workspace_id) {
        Ok(Some(swarm)) => Ok(swarm),
        Ok(None) => Err(error_response(StatusCode::NOT_FOUND, "Swarm not found")),
        Err(e) => Err(db_error("Failed to load swarm", e)),
    }
}

/// Decrypted swarm API key
pub(crate) fn swarm_api_key(state: &AppState, swarm: &Swarm) -> Result<String, HttpResponse> {
    let secrets = state
        .db
        .get_swarm_secrets(&swarm.id)
        .map_err(|e| db_error("Failed to load swarm secrets", e))?;
    let Some(sealed) = secrets.swarm_api_key else {
        return Err(error_response(StatusCode::BAD_REQUEST, "Swarm API key not configured"));
    };
    state
        .crypto
        .decrypt_from_string(fields::SWARM_API_KEY, &sealed)
        .map_err(|e| {
            log::error!("[CRYPTO] Failed to decrypt swarm key for {}: {}", swarm.id, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        })
}

fn authorize(
    state: &AppState,
    req: &HttpRequest,
    workspace_ref: &str,
    permission: Permission,
) -> Result<WorkspaceAccess, HttpResponse> {
    let user = require_user(&state.db, req)?;
    require_workspace(&state.db, workspace_ref, &user.id, permission)
}

async fn get_swarm(state: web::Data<AppState>, req: HttpRequest, path: web::Path<String>) -> impl Responder {
    let access = match authorize(&state, &req, &path, Permission::Read) {
        Ok(a) => a,
        Err(resp) => return resp,
    };
    match load_swarm(&state, &access.workspace.id) {
        Ok(swarm) => HttpResponse::Ok().json(serde_json::json!({ "swarm": swarm })),
        Err(resp) => resp,
    }
}

fn seal_optional(state: &AppState, field: &str, value: Option<&str>) -> Result<Option<String>, HttpResponse> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(plain) => state.crypto.encrypt_to_string(field, plain).map(Some).map_err(|e| {
            log::error!("[CRYPTO] Failed to encrypt {}: {}", field, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }),
        None => Ok(None),
    }
}

async fn upsert_swarm(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
    body: web::Json<UpsertSwarmRequest>,
) -> impl Responder {
    let access = match authorize(&state, &req, &path, Permission::Admin) {
        Ok(a) => a,
        Err(resp) => return resp,
    };

    let name = body.name.trim();
    if name.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Swarm name is required");
    }
    let swarm_url = body.swarm_url.trim();
    if let Err(e) = derive_service_url(swarm_url, state.config.jarvis_port) {
        return error_response(StatusCode::BAD_REQUEST, &e.to_string());
    }

    let swarm_key = match seal_optional(&state, fields::SWARM_API_KEY, body.swarm_api_key.as_deref()) {
        Ok(k) => k,
        Err(resp) => return resp,
    };
    let pool_key = match seal_optional(&state, fields::POOL_API_KEY, body.pool_api_key.as_deref()) {
        Ok(k) => k,
        Err(resp) => return resp,
    };
    let pool_name = body.pool_name.as_deref().map(str::trim).filter(|p| !p.is_empty());

    match state.db.upsert_swarm(
        &access.workspace.id,
        name,
        swarm_url,
        swarm_key.as_deref(),
        pool_name,
        pool_key.as_deref(),
    ) {
        Ok(swarm) => {
            log::info!("[SWARM] Swarm '{}' configured for workspace '{}'", swarm.name, access.workspace.slug);
            HttpResponse::Ok().json(serde_json::json!({ "swarm": swarm }))
        }
        Err(e) => db_error("Failed to save swarm", e),
    }
}

/// Forward a GET to the workspace's Jarvis and wrap the result
async fn proxy_jarvis(state: &AppState, access: &WorkspaceAccess, endpoint: &str) -> HttpResponse {
    let swarm = match load_swarm(state, &access.workspace.id) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    let api_key = match swarm_api_key(state, &swarm) {
        Ok(k) => k,
        Err(resp) => return resp,
    };
    let jarvis_url = match derive_service_url(&swarm.swarm_url, state.config.jarvis_port) {
        Ok(u) => u,
        Err(e) => return swarm_failure(StatusCode::BAD_REQUEST, &e.to_string()),
    };

    match state.swarm.jarvis_get(&jarvis_url, endpoint, &api_key).await {
        Ok((status, data)) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "status": status,
            "data": data
        })),
        Err(e) => {
            log::error!("[SWARM] Jarvis request to {} failed: {}", endpoint, e);
            let message = match &e {
                IntegrationError::Transport(_) => "Failed to reach swarm".to_string(),
                other => other.to_string(),
            };
            swarm_failure(e.status_code(), &message)
        }
    }
}

async fn jarvis_nodes(
    state: web::Data<AppState>,
    req: HttpRequest,
    query: web::Query<JarvisNodesQuery>,
) -> impl Responder {
    let access = match authorize(&state, &req, &query.workspace_id, Permission::Read) {
        Ok(a) => a,
        Err(resp) => return resp,
    };

    let endpoint = query.endpoint.as_deref().unwrap_or(DEFAULT_JARVIS_ENDPOINT);
    let endpoint = match validate_jarvis_endpoint(endpoint) {
        Ok(e) => e,
        Err(e) => return swarm_failure(StatusCode::BAD_REQUEST, &e.to_string()),
    };

    proxy_jarvis(&state, &access, &endpoint).await
}

async fn jarvis_search(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<JarvisSearchRequest>,
) -> impl Responder {
    let access = match authorize(&state, &req, &body.workspace_id, Permission::Read) {
        Ok(a) => a,
        Err(resp) => return resp,
    };

    let query = body.query.trim();
    if query.is_empty() {
        return swarm_failure(StatusCode::BAD_REQUEST, "Query is required");
    }
    let limit = body.limit.unwrap_or(DEFAULT_SEARCH_LIMIT).clamp(1, MAX_SEARCH_LIMIT);
    let endpoint = format!("graph/search?query={}&limit={}", urlencoding::encode(query), limit);

    proxy_jarvis(&state, &access, &endpoint).await
}

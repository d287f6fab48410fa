//! Stakgraph ingestion: starting a job and receiving its status webhooks

use actix_web::{http::StatusCode, web, HttpRequest, HttpResponse, Responder};
use serde::Deserialize;

use super::github::github_token;
use super::swarm::{load_swarm, swarm_api_key};
use super::{db_error, error_response};
use crate::crypto::verify_signature;
use crate::integrations::swarm::{derive_service_url, IngestAsyncRequest};
use crate::middleware::{require_user, require_workspace, Permission};
use crate::services::ingest::{
    next_repository_status, IngestStatus, IngestTransition, IngestWebhookPayload, INGEST_WEBHOOK_SOURCE,
};
use crate::AppState;

pub const SIGNATURE_HEADER: &str = "x-signature";
pub const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Deserialize)]
pub struct StartIngestRequest {
    workspace_id: String,
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/api/swarm/stakgraph/webhook").route(web::post().to(stakgraph_webhook)));
    cfg.service(web::resource("/api/swarm/stakgraph/ingest").route(web::post().to(start_ingest)));
}

fn failure(status: StatusCode, message: &str) -> HttpResponse {
    HttpResponse::build(status).json(serde_json::json!({
        "success": false,
        "message": message
    }))
}

async fn stakgraph_webhook(state: web::Data<AppState>, req: HttpRequest, body: web::Bytes) -> impl Responder {
    let payload: IngestWebhookPayload = match serde_json::from_slice(&body) {
        Ok(p) => p,
        Err(e) => {
            log::warn!("[WEBHOOK] Malformed stakgraph payload: {}", e);
            return failure(StatusCode::BAD_REQUEST, "Invalid JSON payload");
        }
    };
    let request_id = payload.request_id.trim();
    if request_id.is_empty() {
        return failure(StatusCode::BAD_REQUEST, "request_id is required");
    }
    if let Some(header_id) = req.headers().get(REQUEST_ID_HEADER).and_then(|h| h.to_str().ok()) {
        if header_id != request_id {
            log::warn!(
                "[WEBHOOK] {} header '{}' differs from body request_id '{}'",
                REQUEST_ID_HEADER,
                header_id,
                request_id
            );
        }
    }

    let swarm = match state.db.get_swarm_by_ingest_ref(request_id) {
        Ok(Some(s)) => s,
        Ok(None) => return failure(StatusCode::NOT_FOUND, "No swarm for this request_id"),
        Err(e) => {
            log::error!("[WEBHOOK] Failed to look up swarm for {}: {}", request_id, e);
            return failure(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error");
        }
    };

    let signature = req
        .headers()
        .get(SIGNATURE_HEADER)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("");
    // Missing key and decrypt failures both end up unverifiable
    let secret = swarm_api_key(&state, &swarm).ok();
    let verified = match &secret {
        Some(secret) if !signature.is_empty() => verify_signature(secret.as_bytes(), &body, signature),
        _ => false,
    };
    if !verified {
        log::warn!("[WEBHOOK] Invalid signature for stakgraph request {}", request_id);
        return failure(StatusCode::UNAUTHORIZED, "Invalid signature");
    }

    let incoming: IngestStatus = match payload.status.parse() {
        Ok(s) => s,
        Err(msg) => return failure(StatusCode::BAD_REQUEST, &msg),
    };

    // Dedup record and repository updates commit together
    let updated = match state.db.apply_repository_delivery(
        INGEST_WEBHOOK_SOURCE,
        request_id,
        incoming.as_str(),
        &swarm.workspace_id,
        |current| match next_repository_status(current, incoming) {
            IngestTransition::Apply(next) => Some(next),
            IngestTransition::Unchanged => None,
        },
    ) {
        Ok(Some(n)) => n,
        Ok(None) => {
            log::info!("[WEBHOOK] Duplicate stakgraph delivery {} ({})", request_id, incoming.as_str());
            return HttpResponse::Ok().json(serde_json::json!({
                "success": true,
                "duplicate": true
            }));
        }
        Err(e) => {
            log::error!("[WEBHOOK] Failed to apply delivery {}: {}", request_id, e);
            return failure(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error");
        }
    };

    if let Some(error) = &payload.error {
        log::warn!("[WEBHOOK] Stakgraph request {} reported error: {}", request_id, error);
    }
    log::info!(
        "[WEBHOOK] Stakgraph request {} is {} (progress {:?}), {} repositories updated",
        request_id,
        incoming.as_str(),
        payload.progress,
        updated
    );

    HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "status": incoming.as_str(),
        "updated": updated
    }))
}

async fn start_ingest(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<StartIngestRequest>,
) -> impl Responder {
    let user = match require_user(&state.db, &req) {
        Ok(u) => u,
        Err(resp) => return resp,
    };
    let access = match require_workspace(&state.db, &body.workspace_id, &user.id, Permission::Admin) {
        Ok(a) => a,
        Err(resp) => return resp,
    };
    let swarm = match load_swarm(&state, &access.workspace.id) {
        Ok(s) => s,
        Err(resp) => return resp,
    };

    let repositories = match state.db.list_repositories(&access.workspace.id) {
        Ok(r) if !r.is_empty() => r,
        Ok(_) => return error_response(StatusCode::BAD_REQUEST, "Workspace has no repositories"),
        Err(e) => return db_error("Failed to list repositories", e),
    };

    let pat = match github_token(&state, &user) {
        Ok(t) => t,
        Err(resp) => return resp,
    };

    let api_key = match swarm_api_key(&state, &swarm) {
        Ok(k) => k,
        Err(resp) => return resp,
    };
    let stakgraph_url = match derive_service_url(&swarm.swarm_url, state.config.stakgraph_port) {
        Ok(u) => u,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &e.to_string()),
    };

    let request = IngestAsyncRequest {
        repo_url: repositories
            .iter()
            .map(|r| r.repository_url.as_str())
            .collect::<Vec<_>>()
            .join(","),
        username: user.github_username.clone().unwrap_or_default(),
        pat,
        callback_url: format!("{}/api/swarm/stakgraph/webhook", state.config.public_url),
    };

    let response = match state.swarm.ingest_async(&stakgraph_url, &api_key, &request).await {
        Ok(r) => r,
        Err(e) => {
            log::error!("[SWARM] Failed to start ingest for workspace {}: {}", access.workspace.slug, e);
            return failure(e.status_code(), "Failed to start ingest");
        }
    };

    if let Err(e) = state.db.set_swarm_ingest_ref(&swarm.id, &response.request_id) {
        return db_error("Failed to store ingest request id", e);
    }
    for repository in &repositories {
        if let Err(e) = state
            .db
            .set_repository_status(&repository.id, crate::models::RepositoryStatus::Pending)
        {
            log::error!("[SWARM] Failed to reset repository {}: {}", repository.id, e);
        }
    }

    log::info!(
        "[SWARM] Ingest {} started for workspace {} ({} repositories)",
        response.request_id,
        access.workspace.slug,
        repositories.len()
    );
    HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "request_id": response.request_id
    }))
}

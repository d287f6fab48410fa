//! Stakwork project status webhook

use actix_web::{http::StatusCode, web, HttpRequest, HttpResponse, Responder};
use serde::Deserialize;

use crate::middleware::require_api_token;
use crate::services::workflow_status::{map_stakwork_status, should_apply};
use crate::AppState;

#[derive(Deserialize)]
pub struct WebhookQuery {
    task_id: Option<String>,
}

#[derive(Deserialize)]
pub struct StakworkWebhookPayload {
    project_status: Option<String>,
    task_id: Option<String>,
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/api/stakwork/webhook").route(web::post().to(stakwork_webhook)));
}

fn webhook_failure(status: StatusCode, message: &str) -> HttpResponse {
    HttpResponse::build(status).json(serde_json::json!({
        "success": false,
        "message": message
    }))
}

async fn stakwork_webhook(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Bytes,
) -> impl Responder {
    // Open when no shared token is configured
    if state.config.api_token.is_some() {
        if let Err(resp) = require_api_token(state.config.api_token.as_deref(), &req) {
            return resp;
        }
    }

    let query = match web::Query::<WebhookQuery>::from_query(req.query_string()) {
        Ok(q) => q.into_inner(),
        Err(_) => return webhook_failure(StatusCode::BAD_REQUEST, "Invalid query string"),
    };
    let body: StakworkWebhookPayload = match serde_json::from_slice(&body) {
        Ok(b) => b,
        Err(e) => {
            log::warn!("[WEBHOOK] Rejected malformed Stakwork payload: {}", e);
            return webhook_failure(StatusCode::BAD_REQUEST, "Invalid JSON payload");
        }
    };

    let Some(task_id) = query.task_id.as_deref().or(body.task_id.as_deref()) else {
        return webhook_failure(StatusCode::BAD_REQUEST, "task_id is required");
    };
    let Some(raw_status) = body.project_status.as_deref() else {
        return webhook_failure(StatusCode::BAD_REQUEST, "project_status is required");
    };
    let Some(incoming) = map_stakwork_status(raw_status) else {
        log::warn!("[WEBHOOK] Unknown Stakwork status '{}' for task {}", raw_status, task_id);
        return webhook_failure(StatusCode::BAD_REQUEST, &format!("Unknown project_status '{}'", raw_status));
    };

    let task = match state.db.get_task(task_id) {
        Ok(Some(t)) => t,
        Ok(None) => return webhook_failure(StatusCode::NOT_FOUND, "Task not found"),
        Err(e) => {
            log::error!("[WEBHOOK] Failed to load task {}: {}", task_id, e);
            return webhook_failure(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error");
        }
    };

    if !should_apply(task.workflow_status, incoming) {
        return HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "changed": false,
            "workflow_status": task.workflow_status
        }));
    }

    match state.db.set_task_workflow(&task.id, incoming, None) {
        Ok(_) => {
            log::info!(
                "[WEBHOOK] Task {} workflow {} -> {}",
                task.id,
                task.workflow_status,
                incoming
            );
            HttpResponse::Ok().json(serde_json::json!({
                "success": true,
                "changed": true,
                "workflow_status": incoming
            }))
        }
        Err(e) => {
            log::error!("[WEBHOOK] Failed to update task {}: {}", task.id, e);
            webhook_failure(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}

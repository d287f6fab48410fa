use actix_web::{http::StatusCode, web, HttpRequest, HttpResponse, Responder};
use serde::Deserialize;
use serde_json::{json, Value};

use super::tasks::load_task_context;
use super::{db_error, error_response};
use crate::crypto::fields;
use crate::integrations::stakwork::WorkflowRequest;
use crate::middleware::{require_api_token, Permission};
use crate::models::{ChatMessage, ChatRole, MessageStatus, NewArtifact, Task, WorkflowStatus};
use crate::AppState;

#[derive(Deserialize)]
pub struct SendMessageRequest {
    task_id: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    context_tags: Vec<Value>,
    #[serde(default)]
    artifacts: Vec<NewArtifact>,
}

#[derive(Deserialize)]
pub struct AssistantResponseRequest {
    task_id: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    artifacts: Vec<NewArtifact>,
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/api/tasks/{id}/messages").route(web::get().to(list_messages)));
    cfg.service(web::resource("/api/chat/message").route(web::post().to(send_message)));
    cfg.service(web::resource("/api/chat/response").route(web::post().to(assistant_response)));
}

async fn list_messages(state: web::Data<AppState>, req: HttpRequest, path: web::Path<String>) -> impl Responder {
    let ctx = match load_task_context(&state, &req, &path, Permission::Read) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    match state.db.list_chat_messages(&ctx.task.id) {
        Ok(messages) => HttpResponse::Ok().json(json!({
            "task": {
                "id": ctx.task.id,
                "title": ctx.task.title,
                "workflow_status": ctx.task.workflow_status,
                "stakwork_project_id": ctx.task.stakwork_project_id
            },
            "count": messages.len(),
            "messages": messages
        })),
        Err(e) => db_error("Failed to list chat messages", e),
    }
}

/// Workspace Stakwork key, when one is stored and decrypts
fn workspace_stakwork_key(state: &AppState, workspace_id: &str) -> Option<String> {
    let sealed = match state.db.get_workspace_stakwork_key(workspace_id) {
        Ok(Some(s)) => s,
        Ok(None) => return None,
        Err(e) => {
            log::error!("[WORKFLOW] Failed to load workspace Stakwork key: {}", e);
            return None;
        }
    };
    match state.crypto.decrypt_from_string(fields::STAKWORK_API_KEY, &sealed) {
        Ok(key) => Some(key),
        Err(e) => {
            log::error!("[CRYPTO] Failed to decrypt workspace Stakwork key: {}", e);
            None
        }
    }
}

/// Start the task's workflow for a new user message and record the outcome on the
/// task. Returns the `workflow` object of the response.
async fn dispatch_workflow(state: &AppState, task: &Task, message: &ChatMessage) -> Value {
    let Some(provider) = &state.workflow else {
        return Value::Null;
    };

    let request = WorkflowRequest {
        name: format!("hive_task_{}", task.id),
        webhook_url: format!("{}/api/stakwork/webhook?task_id={}", state.config.public_url, task.id),
        vars: json!({
            "taskId": task.id,
            "workspaceId": task.workspace_id,
            "message": message.message,
            "contextTags": message.context_tags,
            "artifacts": message.artifacts,
            "webhookUrl": format!("{}/api/chat/response", state.config.public_url)
        }),
        api_key: workspace_stakwork_key(state, &task.workspace_id),
    };

    match provider.dispatch(request).await {
        Ok(dispatch) => {
            if let Err(e) = state.db.set_task_workflow(&task.id, WorkflowStatus::InProgress, Some(dispatch.project_id)) {
                log::error!("[WORKFLOW] Failed to record project {} on task {}: {}", dispatch.project_id, task.id, e);
            }
            json!({
                "project_id": dispatch.project_id,
                "status": WorkflowStatus::InProgress
            })
        }
        Err(e) => {
            log::error!("[WORKFLOW] Dispatch for task {} failed: {}", task.id, e);
            if let Err(e) = state.db.set_task_workflow(&task.id, WorkflowStatus::Failed, None) {
                log::error!("[WORKFLOW] Failed to mark task {} as failed: {}", task.id, e);
            }
            json!({
                "status": WorkflowStatus::Failed,
                "error": e.to_string()
            })
        }
    }
}

async fn send_message(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<SendMessageRequest>,
) -> impl Responder {
    let ctx = match load_task_context(&state, &req, &body.task_id, Permission::Write) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    let text = body.message.trim();
    if text.is_empty() && body.artifacts.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Message or artifacts are required");
    }

    let message = match state.db.create_chat_message(
        &ctx.task.id,
        text,
        ChatRole::User,
        MessageStatus::Sent,
        &body.context_tags,
        &body.artifacts,
    ) {
        Ok(m) => m,
        Err(e) => return db_error("Failed to store chat message", e),
    };

    let workflow = dispatch_workflow(&state, &ctx.task, &message).await;

    HttpResponse::Created().json(json!({
        "success": true,
        "message": message,
        "workflow": workflow
    }))
}

async fn assistant_response(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Bytes,
) -> impl Responder {
    if let Err(resp) = require_api_token(state.config.api_token.as_deref(), &req) {
        return resp;
    }
    let body: AssistantResponseRequest = match serde_json::from_slice(&body) {
        Ok(b) => b,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &format!("Invalid request body: {}", e)),
    };

    let text = body.message.trim();
    if text.is_empty() && body.artifacts.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Message or artifacts are required");
    }

    match state.db.get_task(&body.task_id) {
        Ok(Some(_)) => {}
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "Task not found"),
        Err(e) => return db_error("Failed to load task", e),
    }

    match state.db.create_chat_message(
        &body.task_id,
        text,
        ChatRole::Assistant,
        MessageStatus::Sent,
        &[],
        &body.artifacts,
    ) {
        Ok(message) => HttpResponse::Created().json(json!({
            "success": true,
            "message": message
        })),
        Err(e) => db_error("Failed to store assistant message", e),
    }
}

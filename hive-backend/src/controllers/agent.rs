use actix_web::{http::StatusCode, web, HttpRequest, HttpResponse, Responder};
use serde::Deserialize;

use super::tasks::load_task_context;
use super::{db_error, error_response};
use crate::ai::{build_agent_messages, AGENT_HISTORY_LIMIT};
use crate::middleware::Permission;
use crate::models::{ChatRole, MessageStatus};
use crate::AppState;

#[derive(Deserialize)]
pub struct AgentRequest {
    task_id: String,
    message: String,
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/api/agent").route(web::post().to(ask_agent)));
}

async fn ask_agent(state: web::Data<AppState>, req: HttpRequest, body: web::Json<AgentRequest>) -> impl Responder {
    let Some(agent) = state.agent.clone() else {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "AI agent is not configured");
    };
    let ctx = match load_task_context(&state, &req, &body.task_id, Permission::Write) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    let text = body.message.trim();
    if text.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Message is required");
    }

    let user_message = match state.db.create_chat_message(
        &ctx.task.id,
        text,
        ChatRole::User,
        MessageStatus::Sending,
        &[],
        &[],
    ) {
        Ok(m) => m,
        Err(e) => return db_error("Failed to store chat message", e),
    };

    let history = match state.db.recent_chat_messages(&ctx.task.id, AGENT_HISTORY_LIMIT) {
        Ok(h) => h,
        Err(e) => return db_error("Failed to load chat history", e),
    };
    let messages = build_agent_messages(&ctx.task.title, &history);
    log::info!(
        "[AGENT] Task {} asking agent with {} messages",
        ctx.task.id,
        messages.len()
    );

    let reply = match agent.complete(messages).await {
        Ok(r) => r,
        Err(e) => {
            log::error!("[AGENT] Completion failed for task {}: {}", ctx.task.id, e);
            if let Err(e) = state.db.set_message_status(&user_message.id, MessageStatus::Error) {
                log::error!("[AGENT] Failed to mark message {} as errored: {}", user_message.id, e);
            }
            return error_response(StatusCode::BAD_GATEWAY, "AI agent request failed");
        }
    };

    if let Err(e) = state.db.set_message_status(&user_message.id, MessageStatus::Sent) {
        log::error!("[AGENT] Failed to mark message {} as sent: {}", user_message.id, e);
    }

    match state.db.create_chat_message(
        &ctx.task.id,
        &reply,
        ChatRole::Assistant,
        MessageStatus::Sent,
        &[],
        &[],
    ) {
        Ok(message) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "message": message
        })),
        Err(e) => db_error("Failed to store assistant reply", e),
    }
}

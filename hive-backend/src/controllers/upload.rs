//! Presigned S3 URLs for task image attachments

use actix_web::{http::StatusCode, web, HttpRequest, HttpResponse, Responder};
use chrono::Utc;
use rand::{distributions::Alphanumeric, Rng};
use serde::Deserialize;

use super::{db_error, error_response};
use super::tasks::load_task_context;
use crate::integrations::s3::{PresignMethod, S3Presigner, DOWNLOAD_URL_TTL_SECS, UPLOAD_URL_TTL_SECS};
use crate::middleware::{require_resource_workspace, require_user, Permission};
use crate::AppState;

pub const ALLOWED_CONTENT_TYPES: [&str; 4] = ["image/jpeg", "image/png", "image/gif", "image/webp"];
pub const MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;
const KEY_PREFIX: &str = "uploads/";

#[derive(Deserialize)]
pub struct PresignUploadRequest {
    task_id: String,
    filename: String,
    content_type: String,
    size: u64,
}

#[derive(Deserialize)]
pub struct DownloadQuery {
    s3_path: String,
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/upload")
            .route("/presigned-url", web::post().to(presign_upload))
            .route("/download-url", web::get().to(presign_download)),
    );
}

/// Replace everything outside `[A-Za-z0-9._-]` with `_`
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') { c } else { '_' })
        .collect();
    if cleaned.is_empty() { "file".to_string() } else { cleaned }
}

/// Workspace id embedded in an upload key, if the key is well formed
pub fn workspace_of_key(s3_path: &str) -> Option<&str> {
    if s3_path.split('/').any(|segment| segment == "..") {
        return None;
    }
    let rest = s3_path.strip_prefix(KEY_PREFIX)?;
    let (workspace_id, remainder) = rest.split_once('/')?;
    if workspace_id.is_empty() || remainder.is_empty() {
        return None;
    }
    Some(workspace_id)
}

fn presigner(state: &AppState) -> Result<&S3Presigner, HttpResponse> {
    state
        .s3
        .as_ref()
        .ok_or_else(|| error_response(StatusCode::SERVICE_UNAVAILABLE, "File uploads are not configured"))
}

async fn presign_upload(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<PresignUploadRequest>,
) -> impl Responder {
    let s3 = match presigner(&state) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    let ctx = match load_task_context(&state, &req, &body.task_id, Permission::Write) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    if !ALLOWED_CONTENT_TYPES.contains(&body.content_type.as_str()) {
        return error_response(
            StatusCode::BAD_REQUEST,
            &format!("Unsupported content type '{}'", body.content_type),
        );
    }
    if body.size == 0 {
        return error_response(StatusCode::BAD_REQUEST, "File is empty");
    }
    if body.size > MAX_UPLOAD_BYTES {
        return error_response(StatusCode::PAYLOAD_TOO_LARGE, "File exceeds the 10 MiB limit");
    }

    let swarm_segment = match state.db.get_swarm_by_workspace(&ctx.task.workspace_id) {
        Ok(Some(swarm)) => swarm.id,
        Ok(None) => "no-swarm".to_string(),
        Err(e) => return db_error("Failed to load swarm", e),
    };

    let now = Utc::now();
    let nonce: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect();
    let filename = sanitize_filename(&body.filename);
    let s3_path = format!(
        "{}{}/{}/{}/{}_{}_{}",
        KEY_PREFIX,
        ctx.task.workspace_id,
        swarm_segment,
        ctx.task.id,
        now.timestamp_millis(),
        nonce,
        filename
    );
    let presigned_url = match s3.presign(PresignMethod::Put, &s3_path, UPLOAD_URL_TTL_SECS).await {
        Ok(url) => url,
        Err(e) => {
            log::error!("[UPLOAD] Failed to presign upload {}: {}", s3_path, e);
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to create upload URL");
        }
    };

    log::info!(
        "[UPLOAD] {} presigned upload {} ({} bytes) for task {}",
        ctx.user.id,
        s3_path,
        body.size,
        ctx.task.id
    );
    HttpResponse::Ok().json(serde_json::json!({
        "presigned_url": presigned_url,
        "s3_path": s3_path,
        "filename": filename,
        "content_type": body.content_type,
        "size": body.size
    }))
}

async fn presign_download(
    state: web::Data<AppState>,
    req: HttpRequest,
    query: web::Query<DownloadQuery>,
) -> impl Responder {
    let s3 = match presigner(&state) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    let user = match require_user(&state.db, &req) {
        Ok(u) => u,
        Err(resp) => return resp,
    };
    let Some(workspace_id) = workspace_of_key(&query.s3_path) else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid s3_path");
    };
    if let Err(resp) = require_resource_workspace(&state.db, workspace_id, &user.id, Permission::Read) {
        return resp;
    }

    let url = match s3.presign(PresignMethod::Get, &query.s3_path, DOWNLOAD_URL_TTL_SECS).await {
        Ok(url) => url,
        Err(e) => {
            log::error!("[UPLOAD] Failed to presign download {}: {}", query.s3_path, e);
            return error_response(e.status_code(), "Failed to create download URL");
        }
    };
    HttpResponse::Ok().json(serde_json::json!({
        "url": url,
        "expires_in": DOWNLOAD_URL_TTL_SECS
    }))
}

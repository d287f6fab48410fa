use actix_web::{error, http::StatusCode, web, HttpRequest, HttpResponse};

pub mod agent;
pub mod auth;
pub mod chat;
pub mod features;
pub mod github;
pub mod health;
pub mod ingest;
pub mod members;
pub mod pool;
pub mod repositories;
pub mod swarm;
pub mod tasks;
pub mod upload;
pub mod voice;
pub mod workflow;
pub mod workspaces;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(json_error_handler));
    cfg.app_data(web::QueryConfig::default().error_handler(query_error_handler));

    health::config(cfg);
    auth::config(cfg);
    workspaces::config(cfg);
    members::config(cfg);
    repositories::config(cfg);
    swarm::config(cfg);
    pool::config(cfg);
    tasks::config(cfg);
    chat::config(cfg);
    workflow::config(cfg);
    ingest::config(cfg);
    github::config(cfg);
    upload::config(cfg);
    agent::config(cfg);
    features::config(cfg);
    voice::config(cfg);
}

/// `{"error": msg}` with the given status
pub(crate) fn error_response(status: StatusCode, message: &str) -> HttpResponse {
    HttpResponse::build(status).json(serde_json::json!({ "error": message }))
}

/// Malformed JSON bodies answer with `{"error"}` like every other 400
fn json_error_handler(err: error::JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    let message = format!("Invalid request body: {}", err);
    error::InternalError::from_response(err, error_response(StatusCode::BAD_REQUEST, &message)).into()
}

fn query_error_handler(err: error::QueryPayloadError, _req: &HttpRequest) -> actix_web::Error {
    let message = format!("Invalid query string: {}", err);
    error::InternalError::from_response(err, error_response(StatusCode::BAD_REQUEST, &message)).into()
}

/// Log a database failure and produce a 500
pub(crate) fn db_error(context: &str, e: rusqlite::Error) -> HttpResponse {
    log::error!("{}: {}", context, e);
    error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
}

pub(crate) fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation
                && err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

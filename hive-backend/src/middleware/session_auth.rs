// Session authentication helpers.
// Controllers call `require_user` at the top of each protected handler.

use actix_web::{HttpRequest, HttpResponse};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::db::Database;
use crate::models::User;

/// Cookie set on login and read as a fallback to the Authorization header
pub const SESSION_COOKIE: &str = "hive_session";

pub fn extract_token(req: &HttpRequest) -> Option<String> {
    let bearer = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    bearer.or_else(|| {
        req.cookie(SESSION_COOKIE)
            .map(|c| c.value().to_string())
            .filter(|s| !s.is_empty())
    })
}

/// Resolve the session user or produce the 401/500 response to return
pub fn require_user(db: &Database, req: &HttpRequest) -> Result<User, HttpResponse> {
    let token = extract_token(req).ok_or_else(|| {
        HttpResponse::Unauthorized().json(serde_json::json!({
            "error": "No authorization token provided"
        }))
    })?;

    match db.get_session_user(&token) {
        Ok(Some(user)) => Ok(user),
        Ok(None) => Err(HttpResponse::Unauthorized().json(serde_json::json!({
            "error": "Invalid or expired session"
        }))),
        Err(e) => {
            log::error!("Session validation error: {}", e);
            Err(HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Internal server error"
            })))
        }
    }
}

/// Check the shared machine-to-machine token in `x-api-token`.
/// Unset `API_TOKEN` disables the endpoint (503).
pub fn require_api_token(expected: Option<&str>, req: &HttpRequest) -> Result<(), HttpResponse> {
    let Some(expected) = expected else {
        return Err(HttpResponse::ServiceUnavailable().json(serde_json::json!({
            "error": "API token not configured"
        })));
    };

    let provided = req
        .headers()
        .get("x-api-token")
        .and_then(|h| h.to_str().ok())
        .unwrap_or("");

    if tokens_match(provided, expected) {
        Ok(())
    } else {
        Err(HttpResponse::Unauthorized().json(serde_json::json!({
            "error": "Unauthorized"
        })))
    }
}

/// Compares fixed-size digests so neither content nor length is observable through timing
fn tokens_match(provided: &str, expected: &str) -> bool {
    let provided = Sha256::digest(provided.as_bytes());
    let expected = Sha256::digest(expected.as_bytes());
    provided.as_slice().ct_eq(expected.as_slice()).into()
}

use actix_web::cookie::{time::Duration as CookieDuration, Cookie};
use actix_web::{http::StatusCode, web, HttpRequest, HttpResponse, Responder};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use super::{db_error, error_response};
use crate::crypto::fields;
use crate::db::{format_ts, GITHUB_PROVIDER};
use crate::integrations::IntegrationError;
use crate::middleware::{extract_token, require_user, SESSION_COOKIE};
use crate::models::{Session, User, UserProfile};
use crate::AppState;

static MOCK_USERNAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9-]{1,39}$").unwrap());

#[derive(Deserialize)]
pub struct GitHubLoginRequest {
    access_token: String,
}

#[derive(Deserialize)]
pub struct MockLoginRequest {
    username: String,
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/auth")
            .route("/github", web::post().to(github_login))
            .route("/mock", web::post().to(mock_login))
            .route("/logout", web::post().to(logout))
            .route("/me", web::get().to(me)),
    );
}

fn session_cookie(token: &str, ttl_hours: i64) -> Cookie<'static> {
    Cookie::build(SESSION_COOKIE, token.to_string())
        .path("/")
        .http_only(true)
        .max_age(CookieDuration::hours(ttl_hours))
        .finish()
}

fn login_response(state: &AppState, user: &User, session: &Session) -> HttpResponse {
    HttpResponse::Ok()
        .cookie(session_cookie(&session.token, state.config.session_ttl_hours))
        .json(serde_json::json!({
            "success": true,
            "token": session.token,
            "expires_at": format_ts(session.expires_at),
            "user": user
        }))
}

async fn github_login(state: web::Data<AppState>, body: web::Json<GitHubLoginRequest>) -> impl Responder {
    let access_token = body.access_token.trim();
    if access_token.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "access_token is required");
    }

    let gh_user = match state.github.get_user(access_token).await {
        Ok(u) => u,
        Err(IntegrationError::Unauthorized) => {
            return error_response(StatusCode::UNAUTHORIZED, "Invalid GitHub access token");
        }
        Err(e) => {
            log::error!("[GITHUB] Failed to verify access token: {}", e);
            return error_response(e.status_code(), "Failed to verify GitHub access token");
        }
    };

    let profile = UserProfile {
        name: gh_user.name.clone(),
        email: gh_user.email.clone(),
        image: gh_user.avatar_url.clone(),
        github_username: Some(gh_user.login.clone()),
        github_id: Some(gh_user.id),
    };
    let user = match state.db.upsert_github_user(&profile) {
        Ok(u) => u,
        Err(e) => return db_error("Failed to upsert GitHub user", e),
    };
    if user.deleted {
        return error_response(StatusCode::UNAUTHORIZED, "Account has been deleted");
    }

    let sealed = match state.crypto.encrypt_to_string(fields::ACCESS_TOKEN, access_token) {
        Ok(s) => s,
        Err(e) => {
            log::error!("[CRYPTO] Failed to encrypt GitHub token: {}", e);
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error");
        }
    };
    if let Err(e) = state.db.upsert_account(
        &user.id,
        GITHUB_PROVIDER,
        &gh_user.id.to_string(),
        &sealed,
        None,
    ) {
        return db_error("Failed to store GitHub account", e);
    }

    match state.db.create_session(&user.id, state.config.session_ttl_hours) {
        Ok(session) => {
            log::info!("[GITHUB] User {} signed in", gh_user.login);
            login_response(&state, &user, &session)
        }
        Err(e) => db_error("Failed to create session", e),
    }
}

async fn mock_login(state: web::Data<AppState>, body: web::Json<MockLoginRequest>) -> impl Responder {
    if !state.config.mock_auth_enabled {
        return error_response(StatusCode::NOT_FOUND, "Not found");
    }

    let username = body.username.trim();
    if !MOCK_USERNAME.is_match(username) {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Username must be 1-39 characters of letters, digits or '-'",
        );
    }

    let user = match state.db.upsert_mock_user(username) {
        Ok(u) => u,
        Err(e) => return db_error("Failed to upsert mock user", e),
    };
    if user.deleted {
        return error_response(StatusCode::UNAUTHORIZED, "Account has been deleted");
    }

    match state.db.create_session(&user.id, state.config.session_ttl_hours) {
        Ok(session) => login_response(&state, &user, &session),
        Err(e) => db_error("Failed to create session", e),
    }
}

async fn logout(state: web::Data<AppState>, req: HttpRequest) -> impl Responder {
    if let Some(token) = extract_token(&req) {
        if let Err(e) = state.db.delete_session(&token) {
            log::error!("Failed to delete session: {}", e);
        }
    }

    let mut expired = session_cookie("", 0);
    expired.make_removal();
    HttpResponse::Ok()
        .cookie(expired)
        .json(serde_json::json!({ "success": true }))
}

async fn me(state: web::Data<AppState>, req: HttpRequest) -> impl Responder {
    match require_user(&state.db, &req) {
        Ok(user) => HttpResponse::Ok().json(serde_json::json!({ "user": user })),
        Err(resp) => resp,
    }
}

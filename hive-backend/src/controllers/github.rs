use actix_web::{http::StatusCode, web, HttpRequest, HttpResponse, Responder};
use chrono::{Duration, Utc};
use serde::Deserialize;

use super::{db_error, error_response};
use crate::crypto::fields;
use crate::db::{format_ts, GITHUB_PROVIDER};
use crate::integrations::github::parse_repository_url;
use crate::integrations::IntegrationError;
use crate::middleware::{require_user, require_workspace, Permission};
use crate::models::User;
use crate::services::pr_metrics::{compute_pr_metrics, DEFAULT_WINDOW_HOURS, MAX_WINDOW_HOURS};
use crate::AppState;

#[derive(Deserialize)]
pub struct RepositoryQuery {
    repo_url: String,
}

#[derive(Deserialize)]
pub struct PrMetricsQuery {
    workspace_id: String,
    window_hours: Option<i64>,
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/api/github/repositories").route(web::get().to(list_repositories)));
    cfg.service(web::resource("/api/github/repository").route(web::get().to(get_repository)));
    cfg.service(web::resource("/api/github/repository/branches").route(web::get().to(list_branches)));
    cfg.service(web::resource("/api/github/pr-metrics").route(web::get().to(pr_metrics)));
}

/// The caller's decrypted GitHub access token
pub(crate) fn github_token(state: &AppState, user: &User) -> Result<String, HttpResponse> {
    let missing = || error_response(StatusCode::UNAUTHORIZED, "GitHub access token not found");
    let sealed = match state.db.get_account_token(&user.id, GITHUB_PROVIDER) {
        Ok(Some(sealed)) => sealed,
        Ok(None) => return Err(missing()),
        Err(e) => return Err(db_error("Failed to load GitHub token", e)),
    };
    state
        .crypto
        .decrypt_from_string(fields::ACCESS_TOKEN, &sealed)
        .map_err(|e| {
            log::error!("[CRYPTO] Failed to decrypt GitHub token for {}: {}", user.id, e);
            missing()
        })
}

fn github_failure(e: IntegrationError) -> HttpResponse {
    log::warn!("[GITHUB] Request failed: {}", e);
    match e {
        IntegrationError::Unauthorized => error_response(StatusCode::UNAUTHORIZED, "GitHub token is invalid or expired"),
        IntegrationError::Forbidden => error_response(StatusCode::FORBIDDEN, "Access to repository forbidden"),
        IntegrationError::NotFound => error_response(StatusCode::NOT_FOUND, "Repository not found"),
        IntegrationError::InvalidInput(msg) => error_response(StatusCode::BAD_REQUEST, &msg),
        _ => error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to reach GitHub"),
    }
}

fn authorize(state: &AppState, req: &HttpRequest) -> Result<String, HttpResponse> {
    let user = require_user(&state.db, req)?;
    github_token(state, &user)
}

async fn list_repositories(state: web::Data<AppState>, req: HttpRequest) -> impl Responder {
    let token = match authorize(&state, &req) {
        Ok(t) => t,
        Err(resp) => return resp,
    };

    match state.github.list_repositories(&token).await {
        Ok(repositories) => HttpResponse::Ok().json(serde_json::json!({
            "repositories": repositories,
            "total_count": repositories.len()
        })),
        Err(e) => github_failure(e),
    }
}

async fn get_repository(
    state: web::Data<AppState>,
    req: HttpRequest,
    query: web::Query<RepositoryQuery>,
) -> impl Responder {
    let token = match authorize(&state, &req) {
        Ok(t) => t,
        Err(resp) => return resp,
    };
    let (owner, repo) = match parse_repository_url(&query.repo_url) {
        Ok(parts) => parts,
        Err(e) => return github_failure(e),
    };

    match state.github.get_repository(&token, &owner, &repo).await {
        Ok(repository) => HttpResponse::Ok().json(repository),
        Err(e) => github_failure(e),
    }
}

async fn list_branches(
    state: web::Data<AppState>,
    req: HttpRequest,
    query: web::Query<RepositoryQuery>,
) -> impl Responder {
    let token = match authorize(&state, &req) {
        Ok(t) => t,
        Err(resp) => return resp,
    };
    let (owner, repo) = match parse_repository_url(&query.repo_url) {
        Ok(parts) => parts,
        Err(e) => return github_failure(e),
    };

    match state.github.list_branches(&token, &owner, &repo).await {
        Ok(branches) => HttpResponse::Ok().json(serde_json::json!({
            "branches": branches,
            "total_count": branches.len()
        })),
        Err(e) => github_failure(e),
    }
}

async fn pr_metrics(state: web::Data<AppState>, req: HttpRequest, query: web::Query<PrMetricsQuery>) -> impl Responder {
    let user = match require_user(&state.db, &req) {
        Ok(u) => u,
        Err(resp) => return resp,
    };
    let window = query.window_hours.unwrap_or(DEFAULT_WINDOW_HOURS);
    if !(1..=MAX_WINDOW_HOURS).contains(&window) {
        return error_response(
            StatusCode::BAD_REQUEST,
            &format!("window_hours must be between 1 and {}", MAX_WINDOW_HOURS),
        );
    }
    let access = match require_workspace(&state.db, &query.workspace_id, &user.id, Permission::Read) {
        Ok(a) => a,
        Err(resp) => return resp,
    };

    let now = Utc::now();
    let since = format_ts(now - Duration::hours(window));
    match state.db.list_pull_request_records(&access.workspace.id, &since) {
        Ok(records) => HttpResponse::Ok().json(compute_pr_metrics(&records, now, window)),
        Err(e) => db_error("Failed to load pull request artifacts", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ArtifactType, ChatRole, MessageStatus, NewArtifact, NewTask, TaskStatus};
    use crate::test_support::{create_workspace, login, stub_upstream, test_state, TestStateBuilder};
    use actix_web::test;
    use serde_json::{json, Value};

    #[actix_web::test]
    async fn test_requires_stored_token() {
        let state = test_state();
        let (_, auth) = login(&state, "octo");
        let app = crate::test_app!(state);

        for uri in [
            "/api/github/repositories",
            "/api/github/repository?repo_url=https://github.com/o/r",
            "/api/github/repository/branches?repo_url=https://github.com/o/r",
        ] {
            let req = test::TestRequest::get()
                .uri(uri)
                .insert_header(("Authorization", auth.clone()))
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::UNAUTHORIZED, "{}", uri);
            let body: Value = test::read_body_json(resp).await;
            assert_eq!(body["error"], "GitHub access token not found");
        }

        let req = test::TestRequest::get().uri("/api/github/repositories").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn test_invalid_repository_url() {
        let state = test_state();
        let (user, auth) = login(&state, "octo");
        let sealed = state.crypto.encrypt_to_string(fields::ACCESS_TOKEN, "gho_token").unwrap();
        state
            .db
            .upsert_account(&user.id, GITHUB_PROVIDER, "1", &sealed, None)
            .unwrap();
        let app = crate::test_app!(state);

        let req = test::TestRequest::get()
            .uri("/api/github/repository?repo_url=https://gitlab.com/o/r")
            .insert_header(("Authorization", auth))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_pr_metrics() {
        let state = test_state();
        let (owner, auth) = login(&state, "owner");
        let ws = create_workspace(&state, &owner, "acme");
        let task = state
            .db
            .create_task(&NewTask {
                workspace_id: ws.id.clone(),
                title: "Ship it".to_string(),
                description: None,
                status: TaskStatus::InProgress,
                priority: Default::default(),
                assignee_id: None,
                repository_id: None,
                created_by_id: owner.id.clone(),
            })
            .unwrap();
        // PR 1 is reported twice as it moves from open to merged
        for (number, status) in [(1, "IN_PROGRESS"), (2, "DONE"), (1, "DONE"), (3, "IN_PROGRESS")] {
            state
                .db
                .create_chat_message(
                    &task.id,
                    "pr update",
                    ChatRole::Assistant,
                    MessageStatus::Sent,
                    &[],
                    &[NewArtifact {
                        artifact_type: ArtifactType::PullRequest,
                        content: json!({ "status": status, "url": format!("https://github.com/o/r/pull/{}", number) }),
                        icon: None,
                    }],
                )
                .unwrap();
        }
        let app = crate::test_app!(state);

        let req = test::TestRequest::get()
            .uri(&format!("/api/github/pr-metrics?workspace_id={}", ws.id))
            .insert_header(("Authorization", auth.clone()))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["window_hours"], 72);
        assert_eq!(body["pr_count"], 3);
        assert_eq!(body["merged_count"], 2);
        assert_eq!(body["open_count"], 1);
        assert_eq!(body["success_rate"], 66.67);

        for window in [0, 721] {
            let req = test::TestRequest::get()
                .uri(&format!("/api/github/pr-metrics?workspace_id={}&window_hours={}", ws.id, window))
                .insert_header(("Authorization", auth.clone()))
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        }

        let (_, outsider) = login(&state, "outsider");
        let req = test::TestRequest::get()
            .uri(&format!("/api/github/pr-metrics?workspace_id={}", ws.id))
            .insert_header(("Authorization", outsider))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_github_error_statuses() {
        for (upstream_status, expected, message) in [
            (401, StatusCode::UNAUTHORIZED, "GitHub token is invalid or expired"),
            (403, StatusCode::FORBIDDEN, "Access to repository forbidden"),
            (404, StatusCode::NOT_FOUND, "Repository not found"),
        ] {
            let upstream = stub_upstream(upstream_status, json!({ "message": "nope" }));
            let base_url = upstream.base_url.clone();
            let state = TestStateBuilder::new().config(|c| c.github_api_url = base_url).build();
            let (user, auth) = login(&state, "octo");
            let sealed = state.crypto.encrypt_to_string(fields::ACCESS_TOKEN, "gho_token").unwrap();
            state
                .db
                .upsert_account(&user.id, GITHUB_PROVIDER, "1", &sealed, None)
                .unwrap();
            let app = crate::test_app!(state);

            let req = test::TestRequest::get()
                .uri("/api/github/repository?repo_url=https://github.com/acme/api")
                .insert_header(("Authorization", auth))
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), expected);
            let body: Value = test::read_body_json(resp).await;
            assert_eq!(body["error"], message);

            let seen = upstream.seen.lock();
            assert_eq!(seen.len(), 1);
            assert_eq!(seen[0].path_and_query, "/repos/acme/api");
            assert_eq!(seen[0].authorization.as_deref(), Some("token gho_token"));
        }
    }

    #[actix_web::test]
    async fn test_github_repository_lookup() {
        let upstream = stub_upstream(
            200,
            json!({
                "id": 7,
                "name": "api",
                "full_name": "acme/api",
                "description": null,
                "private": true,
                "html_url": "https://github.com/acme/api",
                "default_branch": "main"
            }),
        );
        let base_url = upstream.base_url.clone();
        let state = TestStateBuilder::new().config(|c| c.github_api_url = base_url).build();
        let (user, auth) = login(&state, "octo");
        let sealed = state.crypto.encrypt_to_string(fields::ACCESS_TOKEN, "gho_token").unwrap();
        state
            .db
            .upsert_account(&user.id, GITHUB_PROVIDER, "1", &sealed, None)
            .unwrap();
        let app = crate::test_app!(state);

        let req = test::TestRequest::get()
            .uri("/api/github/repository?repo_url=https://github.com/acme/api.git")
            .insert_header(("Authorization", auth))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["full_name"], "acme/api");
        assert_eq!(body["url"], "https://github.com/acme/api");
        assert_eq!(body["stargazers_count"], 0);
    }
}

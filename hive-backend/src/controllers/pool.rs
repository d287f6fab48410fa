use actix_web::{http::StatusCode, web, HttpRequest, HttpResponse, Responder};
use chrono::Utc;
use serde::Deserialize;

use super::swarm::load_swarm;
use super::{db_error, error_response};
use crate::middleware::{require_user, require_workspace, Permission};
use crate::models::PodReport;
use crate::services::pool_status::aggregate_pool_status;
use crate::AppState;

#[derive(Deserialize)]
pub struct SyncPodsRequest {
    pods: Vec<PodReport>,
}

#[derive(Deserialize, Default)]
pub struct ClaimPodRequest {
    task_id: Option<String>,
}

#[derive(Deserialize)]
pub struct ReleasePodRequest {
    pod_id: String,
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/api/workspaces/{slug}/pool/status").route(web::get().to(pool_status)));
    cfg.service(web::resource("/api/workspaces/{slug}/pool/pods").route(web::put().to(sync_pods)));
    cfg.service(web::resource("/api/workspaces/{slug}/pool/claim").route(web::post().to(claim_pod)));
    cfg.service(web::resource("/api/workspaces/{slug}/pool/release").route(web::post().to(release_pod)));
}

async fn pool_status(state: web::Data<AppState>, req: HttpRequest, path: web::Path<String>) -> impl Responder {
    let user = match require_user(&state.db, &req) {
        Ok(u) => u,
        Err(resp) => return resp,
    };
    let access = match require_workspace(&state.db, &path, &user.id, Permission::Read) {
        Ok(a) => a,
        Err(resp) => return resp,
    };
    let swarm = match load_swarm(&state, &access.workspace.id) {
        Ok(s) => s,
        Err(resp) => return resp,
    };

    match state.db.list_pods(&swarm.id) {
        Ok(pods) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "data": aggregate_pool_status(&pods, Utc::now())
        })),
        Err(e) => db_error("Failed to list pods", e),
    }
}

async fn sync_pods(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
    body: web::Json<SyncPodsRequest>,
) -> impl Responder {
    let user = match require_user(&state.db, &req) {
        Ok(u) => u,
        Err(resp) => return resp,
    };
    let access = match require_workspace(&state.db, &path, &user.id, Permission::Admin) {
        Ok(a) => a,
        Err(resp) => return resp,
    };
    let swarm = match load_swarm(&state, &access.workspace.id) {
        Ok(s) => s,
        Err(resp) => return resp,
    };

    if body.pods.iter().any(|p| p.pod_id.trim().is_empty()) {
        return error_response(StatusCode::BAD_REQUEST, "pod_id cannot be empty");
    }

    match state.db.sync_pods(&swarm.id, &body.pods) {
        Ok(pods) => {
            log::info!("[SWARM] Synced {} pods for swarm {}", pods.len(), swarm.id);
            HttpResponse::Ok().json(serde_json::json!({ "pods": pods }))
        }
        Err(e) => db_error("Failed to sync pods", e),
    }
}

async fn claim_pod(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
    body: Option<web::Json<ClaimPodRequest>>,
) -> impl Responder {
    let user = match require_user(&state.db, &req) {
        Ok(u) => u,
        Err(resp) => return resp,
    };
    let access = match require_workspace(&state.db, &path, &user.id, Permission::Write) {
        Ok(a) => a,
        Err(resp) => return resp,
    };
    let swarm = match load_swarm(&state, &access.workspace.id) {
        Ok(s) => s,
        Err(resp) => return resp,
    };

    let body = body.map(web::Json::into_inner).unwrap_or_default();
    if let Some(task_id) = &body.task_id {
        match state.db.get_task(task_id) {
            Ok(Some(task)) if task.workspace_id == access.workspace.id => {}
            Ok(_) => return error_response(StatusCode::BAD_REQUEST, "Task not found in this workspace"),
            Err(e) => return db_error("Failed to load task", e),
        }
    }

    match state.db.claim_pod(&swarm.id, &user.id) {
        Ok(Some(pod)) => {
            log::info!(
                "[SWARM] Pod {} claimed by {} (task: {})",
                pod.pod_id,
                user.id,
                body.task_id.as_deref().unwrap_or("-")
            );
            HttpResponse::Ok().json(serde_json::json!({
                "pod_id": pod.pod_id,
                "frontend_url": pod.frontend_url
            }))
        }
        Ok(None) => error_response(StatusCode::CONFLICT, "No available pods"),
        Err(e) => db_error("Failed to claim pod", e),
    }
}

async fn release_pod(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
    body: web::Json<ReleasePodRequest>,
) -> impl Responder {
    let user = match require_user(&state.db, &req) {
        Ok(u) => u,
        Err(resp) => return resp,
    };
    let access = match require_workspace(&state.db, &path, &user.id, Permission::Write) {
        Ok(a) => a,
        Err(resp) => return resp,
    };
    let swarm = match load_swarm(&state, &access.workspace.id) {
        Ok(s) => s,
        Err(resp) => return resp,
    };

    match state.db.release_pod(&swarm.id, &body.pod_id, &user.id) {
        Ok(true) => HttpResponse::Ok().json(serde_json::json!({ "success": true })),
        Ok(false) => error_response(StatusCode::NOT_FOUND, "Pod not found"),
        Err(e) => db_error("Failed to release pod", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PodStatus, WorkspaceRole};
    use crate::test_support::{create_workspace, login, test_state};
    use actix_web::test;
    use serde_json::{json, Value};

    fn setup_swarm(state: &AppState, workspace_id: &str) {
        state
            .db
            .upsert_swarm(workspace_id, "swarm", "https://swarm.example", None, None, None)
            .unwrap();
    }

    #[actix_web::test]
    async fn test_pool_lifecycle() {
        let state = test_state();
        let (owner, auth) = login(&state, "owner");
        let ws = create_workspace(&state, &owner, "acme");
        setup_swarm(&state, &ws.id);
        let app = crate::test_app!(state);

        let req = test::TestRequest::put()
            .uri("/api/workspaces/acme/pool/pods")
            .insert_header(("Authorization", auth.clone()))
            .set_json(json!({ "pods": [
                { "pod_id": "pod-a", "status": "RUNNING", "frontend_url": "https://a.example" },
                { "pod_id": "pod-b", "status": "STARTING" },
                { "pod_id": "pod-c", "status": "CRASHING" }
            ]}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let req = test::TestRequest::post()
            .uri("/api/workspaces/acme/pool/claim")
            .insert_header(("Authorization", auth.clone()))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["pod_id"], "pod-a");
        assert_eq!(body["frontend_url"], "https://a.example");

        let req = test::TestRequest::post()
            .uri("/api/workspaces/acme/pool/claim")
            .insert_header(("Authorization", auth.clone()))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        let req = test::TestRequest::get()
            .uri("/api/workspaces/acme/pool/status")
            .insert_header(("Authorization", auth.clone()))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["running_vms"], 1);
        assert_eq!(body["data"]["used_vms"], 1);
        assert_eq!(body["data"]["pending_vms"], 1);
        assert_eq!(body["data"]["failed_vms"], 1);

        let req = test::TestRequest::post()
            .uri("/api/workspaces/acme/pool/release")
            .insert_header(("Authorization", auth.clone()))
            .set_json(json!({ "pod_id": "pod-a" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let req = test::TestRequest::post()
            .uri("/api/workspaces/acme/pool/release")
            .insert_header(("Authorization", auth))
            .set_json(json!({ "pod_id": "pod-zzz" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_pool_requires_swarm_and_roles() {
        let state = test_state();
        let (owner, auth) = login(&state, "owner");
        let (viewer, viewer_auth) = login(&state, "viewer");
        let ws = create_workspace(&state, &owner, "acme");
        state.db.add_member(&ws.id, &viewer.id, WorkspaceRole::Viewer).unwrap();
        let app = crate::test_app!(state);

        let req = test::TestRequest::get()
            .uri("/api/workspaces/acme/pool/status")
            .insert_header(("Authorization", auth))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        setup_swarm(&state, &ws.id);
        state
            .db
            .sync_pods(
                &state.db.get_swarm_by_workspace(&ws.id).unwrap().unwrap().id,
                &[PodReport { pod_id: "p".to_string(), status: PodStatus::Running, frontend_url: None }],
            )
            .unwrap();

        let req = test::TestRequest::post()
            .uri("/api/workspaces/acme/pool/claim")
            .insert_header(("Authorization", viewer_auth))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }
}

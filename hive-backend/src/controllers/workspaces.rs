use actix_web::{http::StatusCode, web, HttpRequest, HttpResponse, Responder};
use serde::Deserialize;

use super::{db_error, error_response, is_unique_violation};
use crate::crypto::fields;
use crate::middleware::{require_user, require_workspace, Permission};
use crate::models::{CreateWorkspaceRequest, UpdateWorkspaceRequest, WorkspaceResponse, WorkspaceRole};
use crate::services::slug::validate_slug;
use crate::AppState;

#[derive(Deserialize)]
pub struct StakworkKeyRequest {
    api_key: String,
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/api/workspaces")
            .route(web::get().to(list_workspaces))
            .route(web::post().to(create_workspace)),
    );
    cfg.service(
        web::resource("/api/workspaces/{slug}")
            .route(web::get().to(get_workspace))
            .route(web::put().to(update_workspace))
            .route(web::delete().to(delete_workspace)),
    );
    cfg.service(
        web::resource("/api/workspaces/{slug}/stakwork-key").route(web::put().to(set_stakwork_key)),
    );
}

async fn create_workspace(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<CreateWorkspaceRequest>,
) -> impl Responder {
    let user = match require_user(&state.db, &req) {
        Ok(u) => u,
        Err(resp) => return resp,
    };

    let name = body.name.trim();
    if name.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Workspace name is required");
    }
    let slug = body.slug.trim().to_lowercase();
    if let Err(msg) = validate_slug(&slug) {
        return error_response(StatusCode::BAD_REQUEST, &msg);
    }

    match state.db.slug_exists(&slug) {
        Ok(true) => return error_response(StatusCode::CONFLICT, "A workspace with this slug already exists"),
        Ok(false) => {}
        Err(e) => return db_error("Failed to check workspace slug", e),
    }

    let description = body.description.as_deref().map(str::trim).filter(|d| !d.is_empty());
    match state.db.create_workspace(name, &slug, description, &user.id) {
        Ok(workspace) => {
            log::info!("Workspace '{}' created by {}", workspace.slug, user.id);
            HttpResponse::Created().json(serde_json::json!({
                "workspace": WorkspaceResponse {
                    workspace,
                    user_role: WorkspaceRole::Owner,
                    member_count: Some(1),
                }
            }))
        }
        Err(e) => slug_write_error("Failed to create workspace", e),
    }
}

/// A concurrent writer can claim the slug between the existence check and the write
fn slug_write_error(context: &str, e: rusqlite::Error) -> HttpResponse {
    if is_unique_violation(&e) {
        log::warn!("{}: slug taken concurrently", context);
        return error_response(StatusCode::CONFLICT, "A workspace with this slug already exists");
    }
    db_error(context, e)
}

async fn list_workspaces(state: web::Data<AppState>, req: HttpRequest) -> impl Responder {
    let user = match require_user(&state.db, &req) {
        Ok(u) => u,
        Err(resp) => return resp,
    };

    match state.db.list_workspaces_for_user(&user.id) {
        Ok(rows) => {
            let workspaces: Vec<WorkspaceResponse> = rows
                .into_iter()
                .map(|(workspace, user_role, member_count)| WorkspaceResponse {
                    workspace,
                    user_role,
                    member_count: Some(member_count),
                })
                .collect();
            HttpResponse::Ok().json(serde_json::json!({ "workspaces": workspaces }))
        }
        Err(e) => db_error("Failed to list workspaces", e),
    }
}

async fn get_workspace(state: web::Data<AppState>, req: HttpRequest, path: web::Path<String>) -> impl Responder {
    let user = match require_user(&state.db, &req) {
        Ok(u) => u,
        Err(resp) => return resp,
    };

    match require_workspace(&state.db, &path, &user.id, Permission::Read) {
        Ok(access) => HttpResponse::Ok().json(serde_json::json!({
            "workspace": WorkspaceResponse {
                workspace: access.workspace,
                user_role: access.role,
                member_count: None,
            }
        })),
        Err(resp) => resp,
    }
}

async fn update_workspace(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
    body: web::Json<UpdateWorkspaceRequest>,
) -> impl Responder {
    let user = match require_user(&state.db, &req) {
        Ok(u) => u,
        Err(resp) => return resp,
    };
    let access = match require_workspace(&state.db, &path, &user.id, Permission::Admin) {
        Ok(a) => a,
        Err(resp) => return resp,
    };

    let name = body.name.as_deref().map(str::trim);
    if name == Some("") {
        return error_response(StatusCode::BAD_REQUEST, "Workspace name cannot be empty");
    }

    let slug = body.slug.as_deref().map(|s| s.trim().to_lowercase());
    if let Some(new_slug) = &slug {
        if *new_slug != access.workspace.slug {
            if let Err(msg) = validate_slug(new_slug) {
                return error_response(StatusCode::BAD_REQUEST, &msg);
            }
            match state.db.slug_exists(new_slug) {
                Ok(true) => {
                    return error_response(StatusCode::CONFLICT, "A workspace with this slug already exists");
                }
                Ok(false) => {}
                Err(e) => return db_error("Failed to check workspace slug", e),
            }
        }
    }

    match state.db.update_workspace(
        &access.workspace.id,
        name,
        slug.as_deref(),
        body.description.as_deref().map(str::trim),
    ) {
        Ok(Some(workspace)) => HttpResponse::Ok().json(serde_json::json!({
            "workspace": WorkspaceResponse {
                workspace,
                user_role: access.role,
                member_count: None,
            }
        })),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "Workspace not found"),
        Err(e) => slug_write_error("Failed to update workspace", e),
    }
}

async fn delete_workspace(state: web::Data<AppState>, req: HttpRequest, path: web::Path<String>) -> impl Responder {
    let user = match require_user(&state.db, &req) {
        Ok(u) => u,
        Err(resp) => return resp,
    };
    let access = match require_workspace(&state.db, &path, &user.id, Permission::Read) {
        Ok(a) => a,
        Err(resp) => return resp,
    };
    if !access.is_owner() {
        return error_response(StatusCode::FORBIDDEN, "Only the workspace owner can delete it");
    }

    match state.db.soft_delete_workspace(&access.workspace.id) {
        Ok(true) => {
            log::info!("Workspace '{}' deleted by {}", access.workspace.slug, user.id);
            HttpResponse::Ok().json(serde_json::json!({ "success": true }))
        }
        Ok(false) => error_response(StatusCode::NOT_FOUND, "Workspace not found"),
        Err(e) => db_error("Failed to delete workspace", e),
    }
}

async fn set_stakwork_key(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
    body: web::Json<StakworkKeyRequest>,
) -> impl Responder {
    let user = match require_user(&state.db, &req) {
        Ok(u) => u,
        Err(resp) => return resp,
    };
    let access = match require_workspace(&state.db, &path, &user.id, Permission::Admin) {
        Ok(a) => a,
        Err(resp) => return resp,
    };

    let api_key = body.api_key.trim();
    if api_key.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "API key cannot be empty");
    }

    let sealed = match state.crypto.encrypt_to_string(fields::STAKWORK_API_KEY, api_key) {
        Ok(s) => s,
        Err(e) => {
            log::error!("[CRYPTO] Failed to encrypt Stakwork key: {}", e);
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error");
        }
    };

    match state.db.set_workspace_stakwork_key(&access.workspace.id, &sealed) {
        Ok(_) => HttpResponse::Ok().json(serde_json::json!({ "success": true })),
        Err(e) => db_error("Failed to store Stakwork key", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{create_workspace, login, test_state};
    use actix_web::test;
    use serde_json::{json, Value};

    #[actix_web::test]
    async fn test_slug_race_maps_to_conflict() {
        let state = test_state();
        let (owner, _) = login(&state, "owner");
        create_workspace(&state, &owner, "taken");

        // Same write the handler issues when another request wins the race
        let err = state.db.create_workspace("Other", "taken", None, &owner.id).unwrap_err();
        assert!(is_unique_violation(&err));
        let resp = slug_write_error("Failed to create workspace", err);
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        let bytes = actix_web::body::to_bytes(resp.into_body()).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "A workspace with this slug already exists");

        let err = state.db.create_workspace("Orphan", "fresh", None, "no-such-user").unwrap_err();
        assert!(!is_unique_violation(&err));
        let resp = slug_write_error("Failed to create workspace", err);
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[actix_web::test]
    async fn test_create_and_list_workspaces() {
        let state = test_state();
        let (_, auth) = login(&state, "owner");
        let app = crate::test_app!(state);

        let req = test::TestRequest::post()
            .uri("/api/workspaces")
            .insert_header(("Authorization", auth.clone()))
            .set_json(json!({ "name": "Acme", "slug": "Acme-Team", "description": "Rockets" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["workspace"]["slug"], "acme-team");
        assert_eq!(body["workspace"]["user_role"], "OWNER");

        let req = test::TestRequest::get()
            .uri("/api/workspaces")
            .insert_header(("Authorization", auth))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        let list = body["workspaces"].as_array().unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0]["member_count"], 1);
    }

    #[actix_web::test]
    async fn test_create_rejects_bad_and_taken_slugs() {
        let state = test_state();
        let (owner, auth) = login(&state, "owner");
        create_workspace(&state, &owner, "taken");
        let app = crate::test_app!(state);

        for (slug, expected) in [
            ("api", StatusCode::BAD_REQUEST),
            ("-bad", StatusCode::BAD_REQUEST),
            ("x", StatusCode::BAD_REQUEST),
            ("taken", StatusCode::CONFLICT),
        ] {
            let req = test::TestRequest::post()
                .uri("/api/workspaces")
                .insert_header(("Authorization", auth.clone()))
                .set_json(json!({ "name": "W", "slug": slug }))
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), expected, "slug {}", slug);
        }
    }

    #[actix_web::test]
    async fn test_get_hides_workspace_from_non_members() {
        let state = test_state();
        let (owner, owner_auth) = login(&state, "owner");
        let (_, outsider_auth) = login(&state, "outsider");
        create_workspace(&state, &owner, "acme");
        let app = crate::test_app!(state);

        let req = test::TestRequest::get()
            .uri("/api/workspaces/acme")
            .insert_header(("Authorization", owner_auth))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["workspace"]["user_role"], "OWNER");

        let req = test::TestRequest::get()
            .uri("/api/workspaces/acme")
            .insert_header(("Authorization", outsider_auth))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let req = test::TestRequest::get().uri("/api/workspaces/acme").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn test_update_requires_admin() {
        let state = test_state();
        let (owner, owner_auth) = login(&state, "owner");
        let (dev, dev_auth) = login(&state, "dev");
        let ws = create_workspace(&state, &owner, "acme");
        state.db.add_member(&ws.id, &dev.id, WorkspaceRole::Developer).unwrap();
        let app = crate::test_app!(state);

        let req = test::TestRequest::put()
            .uri("/api/workspaces/acme")
            .insert_header(("Authorization", dev_auth))
            .set_json(json!({ "name": "Hijacked" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let req = test::TestRequest::put()
            .uri("/api/workspaces/acme")
            .insert_header(("Authorization", owner_auth))
            .set_json(json!({ "name": "Acme Corp", "slug": "acme-corp" }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["workspace"]["name"], "Acme Corp");
        assert_eq!(body["workspace"]["slug"], "acme-corp");
    }

    #[actix_web::test]
    async fn test_delete_is_owner_only_and_frees_slug() {
        let state = test_state();
        let (owner, owner_auth) = login(&state, "owner");
        let (admin, admin_auth) = login(&state, "admin");
        let ws = create_workspace(&state, &owner, "acme");
        state.db.add_member(&ws.id, &admin.id, WorkspaceRole::Admin).unwrap();
        let app = crate::test_app!(state);

        let req = test::TestRequest::delete()
            .uri("/api/workspaces/acme")
            .insert_header(("Authorization", admin_auth))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let req = test::TestRequest::delete()
            .uri("/api/workspaces/acme")
            .insert_header(("Authorization", owner_auth.clone()))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let req = test::TestRequest::post()
            .uri("/api/workspaces")
            .insert_header(("Authorization", owner_auth))
            .set_json(json!({ "name": "Acme again", "slug": "acme" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
    }

    #[actix_web::test]
    async fn test_stakwork_key_is_stored_encrypted() {
        let state = test_state();
        let (owner, auth) = login(&state, "owner");
        let ws = create_workspace(&state, &owner, "acme");
        let app = crate::test_app!(state);

        let req = test::TestRequest::put()
            .uri("/api/workspaces/acme/stakwork-key")
            .insert_header(("Authorization", auth))
            .set_json(json!({ "api_key": "sk-live-123" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let stored = state.db.get_workspace_stakwork_key(&ws.id).unwrap().unwrap();
        assert!(!stored.contains("sk-live-123"));
        assert_eq!(
            state.crypto.decrypt_from_string(fields::STAKWORK_API_KEY, &stored).unwrap(),
            "sk-live-123"
        );
    }
}

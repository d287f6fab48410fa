//! Roadmap features

use actix_web::{http::StatusCode, web, HttpRequest, HttpResponse, Responder};
use serde::Deserialize;

use super::tasks::{is_participant, validate_title};
use super::{db_error, error_response};
use crate::middleware::{require_resource_workspace, require_user, Permission};
use crate::models::{CreateFeatureRequest, Feature, UpdateFeatureRequest};
use crate::AppState;

#[derive(Deserialize)]
pub struct ListFeaturesQuery {
    workspace_id: String,
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/features")
            .route("", web::get().to(list_features))
            .route("", web::post().to(create_feature))
            .route("/{id}", web::get().to(get_feature))
            .route("/{id}", web::patch().to(update_feature))
            .route("/{id}", web::delete().to(delete_feature)),
    );
}

fn load_feature(state: &AppState, req: &HttpRequest, id: &str, permission: Permission) -> Result<Feature, HttpResponse> {
    let user = require_user(&state.db, req)?;
    let feature = match state.db.get_feature(id) {
        Ok(Some(f)) => f,
        Ok(None) => return Err(error_response(StatusCode::NOT_FOUND, "Feature not found")),
        Err(e) => return Err(db_error("Failed to load feature", e)),
    };
    require_resource_workspace(&state.db, &feature.workspace_id, &user.id, permission)?;
    Ok(feature)
}

fn check_assignee(state: &AppState, workspace_id: &str, assignee_id: Option<&str>) -> Result<(), HttpResponse> {
    match assignee_id {
        Some(id) if !is_participant(&state.db, workspace_id, id)? => Err(error_response(
            StatusCode::BAD_REQUEST,
            "Assignee is not a member of this workspace",
        )),
        _ => Ok(()),
    }
}

async fn list_features(
    state: web::Data<AppState>,
    req: HttpRequest,
    query: web::Query<ListFeaturesQuery>,
) -> impl Responder {
    let user = match require_user(&state.db, &req) {
        Ok(u) => u,
        Err(resp) => return resp,
    };
    if let Err(resp) = require_resource_workspace(&state.db, &query.workspace_id, &user.id, Permission::Read) {
        return resp;
    }

    match state.db.list_features(&query.workspace_id) {
        Ok(features) => HttpResponse::Ok().json(serde_json::json!({ "features": features })),
        Err(e) => db_error("Failed to list features", e),
    }
}

async fn create_feature(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<CreateFeatureRequest>,
) -> impl Responder {
    let user = match require_user(&state.db, &req) {
        Ok(u) => u,
        Err(resp) => return resp,
    };
    let access = match require_resource_workspace(&state.db, &body.workspace_id, &user.id, Permission::Write) {
        Ok(a) => a,
        Err(resp) => return resp,
    };
    let title = match validate_title(&body.title) {
        Ok(t) => t,
        Err(resp) => return resp,
    };
    if let Err(resp) = check_assignee(&state, &access.workspace.id, body.assignee_id.as_deref()) {
        return resp;
    }

    match state.db.create_feature(
        &access.workspace.id,
        &title,
        body.brief.as_deref(),
        body.status.unwrap_or_default(),
        body.priority.unwrap_or_default(),
        body.assignee_id.as_deref(),
        &user.id,
    ) {
        Ok(feature) => HttpResponse::Created().json(feature),
        Err(e) => db_error("Failed to create feature", e),
    }
}

async fn get_feature(state: web::Data<AppState>, req: HttpRequest, path: web::Path<String>) -> impl Responder {
    match load_feature(&state, &req, &path, Permission::Read) {
        Ok(feature) => HttpResponse::Ok().json(feature),
        Err(resp) => resp,
    }
}

async fn update_feature(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
    body: web::Json<UpdateFeatureRequest>,
) -> impl Responder {
    let feature = match load_feature(&state, &req, &path, Permission::Write) {
        Ok(f) => f,
        Err(resp) => return resp,
    };

    let mut update = body.into_inner();
    if let Some(title) = update.title.take() {
        match validate_title(&title) {
            Ok(t) => update.title = Some(t),
            Err(resp) => return resp,
        }
    }
    if let Some(assignee) = &update.assignee_id {
        if let Err(resp) = check_assignee(&state, &feature.workspace_id, assignee.as_deref()) {
            return resp;
        }
    }

    match state.db.update_feature(&feature.id, &update) {
        Ok(Some(updated)) => HttpResponse::Ok().json(updated),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "Feature not found"),
        Err(e) => db_error("Failed to update feature", e),
    }
}

async fn delete_feature(state: web::Data<AppState>, req: HttpRequest, path: web::Path<String>) -> impl Responder {
    let feature = match load_feature(&state, &req, &path, Permission::Write) {
        Ok(f) => f,
        Err(resp) => return resp,
    };

    match state.db.soft_delete_feature(&feature.id) {
        Ok(_) => HttpResponse::Ok().json(serde_json::json!({ "success": true })),
        Err(e) => db_error("Failed to delete feature", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WorkspaceRole;
    use crate::test_support::{create_workspace, login, test_state};
    use actix_web::test;
    use serde_json::{json, Value};

    #[actix_web::test]
    async fn test_feature_crud() {
        let state = test_state();
        let (owner, auth) = login(&state, "owner");
        let ws = create_workspace(&state, &owner, "acme");
        let app = crate::test_app!(state);

        let req = test::TestRequest::post()
            .uri("/api/features")
            .insert_header(("Authorization", auth.clone()))
            .set_json(json!({ "workspace_id": ws.id, "title": "  Dark mode ", "brief": "Night owls" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let created: Value = test::read_body_json(resp).await;
        assert_eq!(created["title"], "Dark mode");
        assert_eq!(created["status"], "BACKLOG");
        assert_eq!(created["priority"], "MEDIUM");
        let id = created["id"].as_str().unwrap().to_string();

        let req = test::TestRequest::patch()
            .uri(&format!("/api/features/{}", id))
            .insert_header(("Authorization", auth.clone()))
            .set_json(json!({ "status": "PLANNED", "brief": null }))
            .to_request();
        let updated: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(updated["status"], "PLANNED");
        assert!(updated["brief"].is_null());

        let req = test::TestRequest::get()
            .uri(&format!("/api/features?workspace_id={}", ws.id))
            .insert_header(("Authorization", auth.clone()))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["features"].as_array().unwrap().len(), 1);

        let req = test::TestRequest::delete()
            .uri(&format!("/api/features/{}", id))
            .insert_header(("Authorization", auth.clone()))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let req = test::TestRequest::get()
            .uri(&format!("/api/features/{}", id))
            .insert_header(("Authorization", auth))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_feature_permissions() {
        let state = test_state();
        let (owner, auth) = login(&state, "owner");
        let (viewer, viewer_auth) = login(&state, "viewer");
        let (outsider, _) = login(&state, "outsider");
        let ws = create_workspace(&state, &owner, "acme");
        state.db.add_member(&ws.id, &viewer.id, WorkspaceRole::Viewer).unwrap();
        let app = crate::test_app!(state);

        let req = test::TestRequest::post()
            .uri("/api/features")
            .insert_header(("Authorization", viewer_auth.clone()))
            .set_json(json!({ "workspace_id": ws.id, "title": "Nope" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let req = test::TestRequest::post()
            .uri("/api/features")
            .insert_header(("Authorization", auth.clone()))
            .set_json(json!({ "workspace_id": ws.id, "title": "Assign", "assignee_id": outsider.id }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::post()
            .uri("/api/features")
            .insert_header(("Authorization", auth))
            .set_json(json!({ "workspace_id": ws.id, "title": "" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::get()
            .uri(&format!("/api/features?workspace_id={}", ws.id))
            .insert_header(("Authorization", viewer_auth))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }
}

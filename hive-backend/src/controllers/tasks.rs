use actix_web::{http::StatusCode, web, HttpRequest, HttpResponse, Responder};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::{db_error, error_response};
use crate::db::Database;
use crate::middleware::{
    require_resource_workspace, require_user, resolve_workspace_access, AccessError, Permission,
    WorkspaceAccess,
};
use crate::models::{CreateTaskRequest, NewTask, Pagination, Task, TaskStatus, UpdateTaskRequest, User};
use crate::AppState;

pub const MAX_TITLE_LEN: usize = 255;
const DEFAULT_PAGE_SIZE: u32 = 20;
const MAX_PAGE_SIZE: u32 = 100;

#[derive(Deserialize)]
pub struct ListTasksQuery {
    workspace_id: String,
    status: Option<String>,
    page: Option<u32>,
    limit: Option<u32>,
}

#[derive(Serialize)]
struct WorkspaceSummary {
    id: String,
    name: String,
    slug: String,
}

#[derive(Serialize)]
struct TaskDetail {
    #[serde(flatten)]
    task: Task,
    workspace: WorkspaceSummary,
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/api/tasks")
            .route(web::get().to(list_tasks))
            .route(web::post().to(create_task)),
    );
    cfg.service(
        web::resource("/api/tasks/{id}")
            .route(web::get().to(get_task))
            .route(web::patch().to(update_task))
            .route(web::delete().to(delete_task)),
    );
}

/// Everything a task-scoped handler needs: the caller, the live task and the
/// caller's access to its workspace. Missing tasks are 404, lack of access 403.
pub(crate) struct TaskContext {
    pub user: User,
    pub task: Task,
    pub access: WorkspaceAccess,
}

pub(crate) fn load_task_context(
    state: &AppState,
    req: &HttpRequest,
    task_id: &str,
    permission: Permission,
) -> Result<TaskContext, HttpResponse> {
    let user = require_user(&state.db, req)?;
    let task = match state.db.get_task(task_id) {
        Ok(Some(t)) => t,
        Ok(None) => return Err(error_response(StatusCode::NOT_FOUND, "Task not found")),
        Err(e) => return Err(db_error("Failed to load task", e)),
    };
    let access = require_resource_workspace(&state.db, &task.workspace_id, &user.id, permission)?;
    Ok(TaskContext { user, task, access })
}

/// Whether the user is the owner or an active member of the workspace
pub(crate) fn is_participant(db: &Database, workspace_id: &str, user_id: &str) -> Result<bool, HttpResponse> {
    match resolve_workspace_access(db, workspace_id, user_id) {
        Ok(_) => Ok(true),
        Err(AccessError::NotFound) | Err(AccessError::Forbidden) => Ok(false),
        Err(e) => Err(e.into_response()),
    }
}

pub(crate) fn validate_title(title: &str) -> Result<String, HttpResponse> {
    let title = title.trim();
    if title.is_empty() {
        return Err(error_response(StatusCode::BAD_REQUEST, "Title is required"));
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            &format!("Title cannot exceed {} characters", MAX_TITLE_LEN),
        ));
    }
    Ok(title.to_string())
}

async fn create_task(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<CreateTaskRequest>,
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

    if let Some(assignee_id) = &body.assignee_id {
        match is_participant(&state.db, &access.workspace.id, assignee_id) {
            Ok(true) => {}
            Ok(false) => return error_response(StatusCode::BAD_REQUEST, "Assignee is not a member of this workspace"),
            Err(resp) => return resp,
        }
    }
    if let Some(repository_id) = &body.repository_id {
        match state.db.get_repository(repository_id) {
            Ok(Some(repo)) if repo.workspace_id == access.workspace.id => {}
            Ok(_) => return error_response(StatusCode::BAD_REQUEST, "Repository not found in this workspace"),
            Err(e) => return db_error("Failed to load repository", e),
        }
    }

    let new_task = NewTask {
        workspace_id: access.workspace.id.clone(),
        title,
        description: body.description.as_deref().map(str::trim).filter(|d| !d.is_empty()).map(String::from),
        status: body.status.unwrap_or_default(),
        priority: body.priority.unwrap_or_default(),
        assignee_id: body.assignee_id.clone(),
        repository_id: body.repository_id.clone(),
        created_by_id: user.id.clone(),
    };

    match state.db.create_task(&new_task) {
        Ok(task) => HttpResponse::Created().json(serde_json::json!({ "task": task })),
        Err(e) => db_error("Failed to create task", e),
    }
}

async fn list_tasks(
    state: web::Data<AppState>,
    req: HttpRequest,
    query: web::Query<ListTasksQuery>,
) -> impl Responder {
    let user = match require_user(&state.db, &req) {
        Ok(u) => u,
        Err(resp) => return resp,
    };
    let access = match require_resource_workspace(&state.db, &query.workspace_id, &user.id, Permission::Read) {
        Ok(a) => a,
        Err(resp) => return resp,
    };

    let status = match query.status.as_deref().filter(|s| !s.is_empty()) {
        Some(raw) => match TaskStatus::from_str(&raw.to_uppercase()) {
            Ok(s) => Some(s),
            Err(_) => return error_response(StatusCode::BAD_REQUEST, &format!("Invalid status '{}'", raw)),
        },
        None => None,
    };
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);

    match state.db.list_tasks(&access.workspace.id, status, page, limit) {
        Ok((tasks, total)) => HttpResponse::Ok().json(serde_json::json!({
            "tasks": tasks,
            "pagination": Pagination::new(page, limit, total)
        })),
        Err(e) => db_error("Failed to list tasks", e),
    }
}

async fn get_task(state: web::Data<AppState>, req: HttpRequest, path: web::Path<String>) -> impl Responder {
    let ctx = match load_task_context(&state, &req, &path, Permission::Read) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let workspace = ctx.access.workspace;
    HttpResponse::Ok().json(serde_json::json!({
        "task": TaskDetail {
            task: ctx.task,
            workspace: WorkspaceSummary {
                id: workspace.id,
                name: workspace.name,
                slug: workspace.slug,
            },
        }
    }))
}

async fn update_task(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
    body: web::Json<UpdateTaskRequest>,
) -> impl Responder {
    let ctx = match load_task_context(&state, &req, &path, Permission::Write) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    let mut update = body.into_inner();
    if let Some(title) = update.title.take() {
        match validate_title(&title) {
            Ok(t) => update.title = Some(t),
            Err(resp) => return resp,
        }
    }
    if let Some(Some(assignee_id)) = &update.assignee_id {
        match is_participant(&state.db, &ctx.task.workspace_id, assignee_id) {
            Ok(true) => {}
            Ok(false) => return error_response(StatusCode::BAD_REQUEST, "Assignee is not a member of this workspace"),
            Err(resp) => return resp,
        }
    }

    match state.db.update_task(&ctx.task.id, &update) {
        Ok(Some(task)) => HttpResponse::Ok().json(serde_json::json!({ "task": task })),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "Task not found"),
        Err(e) => db_error("Failed to update task", e),
    }
}

async fn delete_task(state: web::Data<AppState>, req: HttpRequest, path: web::Path<String>) -> impl Responder {
    let ctx = match load_task_context(&state, &req, &path, Permission::Write) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    match state.db.soft_delete_task(&ctx.task.id) {
        Ok(true) => {
            log::info!("Task {} deleted by {}", ctx.task.id, ctx.user.id);
            HttpResponse::Ok().json(serde_json::json!({ "success": true }))
        }
        Ok(false) => error_response(StatusCode::NOT_FOUND, "Task not found"),
        Err(e) => db_error("Failed to delete task", e),
    }
}

//! Task CRUD endpoints.
//!
//! `GET /api/tasks` supports a `telegram_id` query filter; `POST /api/tasks`
//! accepts either an explicit `user` reference or a `telegram_id` from
//! which the owner is lazily created. `created_at`, `is_notified` and
//! `notification_sent_at` are read-only; `category_id` and `telegram_id`
//! are write-only.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, patch},
    Json, Router,
};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::store::{Category, NewTask, Task, TaskPatch};

use super::routes::{store_error, AppState};

/// Create task routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_tasks).post(create_task))
        .route("/:id", patch(update_task))
        .route("/:id", delete(delete_task))
}

// ─────────────────────────────────────────────────────────────────────────────
// Request/Response Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct TaskListQuery {
    pub telegram_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub title: String,
    /// Explicit owner reference.
    pub user: Option<i64>,
    /// Telegram chat id; resolves (or creates) the owner when `user` is
    /// absent.
    pub telegram_id: Option<String>,
    pub category_id: Option<i64>,
    pub due_date: Option<NaiveDateTime>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTaskRequest {
    pub title: Option<String>,
    pub category_id: Option<i64>,
    pub due_date: Option<NaiveDateTime>,
}

#[derive(Debug, Serialize)]
pub struct TaskResponse {
    pub id: i64,
    pub user: i64,
    pub title: String,
    pub category: Option<Category>,
    pub category_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub due_date: Option<NaiveDateTime>,
    pub is_notified: bool,
    pub notification_sent_at: Option<DateTime<Utc>>,
}

impl From<Task> for TaskResponse {
    fn from(t: Task) -> Self {
        Self {
            id: t.id,
            user: t.user_id,
            title: t.title,
            category_name: t.category.as_ref().map(|c| c.name.clone()),
            category: t.category,
            created_at: t.created_at,
            due_date: t.due_date,
            is_notified: t.is_notified,
            notification_sent_at: t.notification_sent_at,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// GET /api/tasks - List tasks, optionally filtered by Telegram chat id.
async fn list_tasks(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TaskListQuery>,
) -> Result<Json<Vec<TaskResponse>>, (StatusCode, String)> {
    let tasks = state
        .store
        .list_tasks(query.telegram_id.as_deref())
        .map_err(store_error)?;
    Ok(Json(tasks.into_iter().map(Into::into).collect()))
}

/// POST /api/tasks - Create a task.
async fn create_task(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateTaskRequest>,
) -> Result<(StatusCode, Json<TaskResponse>), (StatusCode, String)> {
    let task = state
        .store
        .create_task(NewTask {
            title: req.title,
            user_id: req.user,
            telegram_id: req.telegram_id,
            category_id: req.category_id,
            due_date: req.due_date,
        })
        .map_err(store_error)?;

    tracing::info!("Created task {} for user {}", task.id, task.username);

    Ok((StatusCode::CREATED, Json(task.into())))
}

/// PATCH /api/tasks/:id - Partially update a task.
async fn update_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateTaskRequest>,
) -> Result<Json<TaskResponse>, (StatusCode, String)> {
    let task = state
        .store
        .update_task(
            id,
            TaskPatch {
                title: req.title,
                category_id: req.category_id,
                due_date: req.due_date,
            },
        )
        .map_err(store_error)?;
    Ok(Json(task.into()))
}

/// DELETE /api/tasks/:id - Delete a task.
async fn delete_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, (StatusCode, String)> {
    if state.store.delete_task(id).map_err(store_error)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err((StatusCode::NOT_FOUND, format!("Task {} not found", id)))
    }
}

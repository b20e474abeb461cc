// src/api/handlers.rs

use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use tracing::info;

use crate::api::error::ApiError;
use crate::api::protocol::{RunRequest, RunResponse, StopResponse, TaskListResponse, TaskResponse};
use crate::api::sse::chunk_sse;
use crate::registry::TaskRegistry;

/// Shared by every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    pub registry: Arc<TaskRegistry>,
    pub keep_alive: Duration,
}

impl AppState {
    pub fn new(registry: Arc<TaskRegistry>) -> Self {
        let keep_alive = registry.settings().stream.keep_alive;
        Self {
            registry,
            keep_alive,
        }
    }
}

/// `POST /api/run`
pub async fn run_task(
    State(state): State<AppState>,
    payload: Result<Json<RunRequest>, JsonRejection>,
) -> Result<Json<RunResponse>, ApiError> {
    let Json(req) = payload?;
    let task_id = state.registry.create(&req.mode, &req.value)?;
    info!(task_id = %task_id, mode = %req.mode, "run request accepted");
    Ok(Json(RunResponse {
        success: true,
        task_id,
    }))
}

/// `GET /api/stream/{task_id}`
pub async fn stream_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let stream = state.registry.subscribe(&task_id)?;
    info!(task_id = %task_id, "stream opened");
    Ok(chunk_sse(stream, state.keep_alive))
}

/// `POST /api/stop/{task_id}`
pub async fn stop_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<StopResponse>, ApiError> {
    state.registry.stop(&task_id)?;
    info!(task_id = %task_id, "stop requested");
    Ok(Json(StopResponse { success: true }))
}

/// `GET /api/tasks`
pub async fn list_tasks(State(state): State<AppState>) -> Json<TaskListResponse> {
    Json(TaskListResponse {
        success: true,
        tasks: state.registry.list(),
    })
}

/// `GET /api/tasks/{task_id}`
pub async fn task_status(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskResponse>, ApiError> {
    let task = state.registry.get(&task_id)?;
    Ok(Json(TaskResponse {
        success: true,
        task: task.snapshot(),
    }))
}

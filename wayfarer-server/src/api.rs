use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tracing::info;
use wayfarer::TaskRequest;

use crate::manager::{TaskManager, TaskView};
use crate::types::{CancelTaskResponse, HealthResponse, SubmitTaskResponse, TaskStatusResponse};

// ============================================================================
// Error Handling
// ============================================================================

pub struct ApiError(StatusCode, String);

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        ApiError(StatusCode::BAD_REQUEST, message.into())
    }

    fn not_found(message: impl Into<String>) -> Self {
        ApiError(StatusCode::NOT_FOUND, message.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.0,
            Json(serde_json::json!({
                "error": self.1
            })),
        )
            .into_response()
    }
}

// ============================================================================
// Health Check
// ============================================================================

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============================================================================
// Submit Task
// ============================================================================

pub async fn submit_task(
    State(manager): State<Arc<TaskManager>>,
    Json(request): Json<TaskRequest>,
) -> Result<(StatusCode, Json<SubmitTaskResponse>), ApiError> {
    if request.task_description.trim().is_empty() {
        return Err(ApiError::bad_request("taskDescription must not be empty"));
    }
    if request.start_url.trim().is_empty() {
        return Err(ApiError::bad_request("startUrl must not be empty"));
    }

    info!(
        "POST /tasks - app: {}, task: {}",
        request.app_identifier, request.task_description
    );

    let task_id = manager.submit(request).await;

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitTaskResponse {
            status: "accepted".to_string(),
            task_id,
        }),
    ))
}

// ============================================================================
// Task Status / Report
// ============================================================================

pub async fn get_task(
    State(manager): State<Arc<TaskManager>>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskStatusResponse>, ApiError> {
    match manager.view(&task_id).await {
        None => Err(ApiError::not_found(format!("unknown task {task_id}"))),
        Some(TaskView::Running {
            status,
            steps_completed,
        }) => Ok(Json(TaskStatusResponse {
            task_id,
            status,
            steps_completed,
            report: None,
        })),
        Some(TaskView::Finished(report)) => Ok(Json(TaskStatusResponse {
            task_id,
            status: report.status,
            steps_completed: report.steps_completed,
            report: Some(report),
        })),
    }
}

// ============================================================================
// Cancel Task
// ============================================================================

pub async fn cancel_task(
    State(manager): State<Arc<TaskManager>>,
    Path(task_id): Path<String>,
) -> Result<Json<CancelTaskResponse>, ApiError> {
    match manager.cancel(&task_id).await {
        None => Err(ApiError::not_found(format!("unknown task {task_id}"))),
        Some(true) => Ok(Json(CancelTaskResponse {
            status: "cancelling".to_string(),
            task_id,
        })),
        Some(false) => Ok(Json(CancelTaskResponse {
            status: "finished".to_string(),
            task_id,
        })),
    }
}

use serde::Serialize;
use wayfarer::{TaskReport, TaskStatus};

// ============================================================================
// Request/Response Types
// ============================================================================

// Task submission reuses `wayfarer::TaskRequest` directly; the wire format
// is the engine's own camelCase contract.

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitTaskResponse {
    pub status: String,
    pub task_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatusResponse {
    pub task_id: String,
    pub status: TaskStatus,
    pub steps_completed: usize,

    /// Full exit report, present once the task has finished
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<TaskReport>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelTaskResponse {
    pub status: String,
    pub task_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

//! The external planning oracle and its invocation discipline.

use crate::errors::EngineError;
use crate::snapshot::PageSnapshot;
use crate::types::Step;
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

/// What the planner gets to see about progress so far.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PlanContext {
    pub completed_steps: Vec<Step>,
    pub recent_snapshots: Vec<PageSnapshot>,
    /// Why a revised plan is being requested, when it is one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision_reason: Option<String>,
}

/// Opaque planning oracle: turns a task description plus the current state
/// into an ordered list of candidate steps. Treated as fallible and slow;
/// repeated calls with the same input may return different plans, and the
/// orchestrator never assumes idempotence.
#[async_trait]
pub trait Planner: Send + Sync {
    async fn plan_steps(
        &self,
        task_description: &str,
        current: &PageSnapshot,
        history: &PlanContext,
    ) -> Result<Vec<Step>, EngineError>;
}

/// Invoke the planner under a deadline. A hung planner degrades to a typed
/// timeout the orchestrator maps to a stuck or failed transition, never to
/// an indefinite block.
pub async fn plan_with_timeout(
    planner: &dyn Planner,
    task_description: &str,
    current: &PageSnapshot,
    history: &PlanContext,
    timeout: Duration,
) -> Result<Vec<Step>, EngineError> {
    match tokio::time::timeout(
        timeout,
        planner.plan_steps(task_description, current, history),
    )
    .await
    {
        Ok(result) => result,
        Err(_) => Err(EngineError::Timeout(format!(
            "planner did not answer within {}ms",
            timeout.as_millis()
        ))),
    }
}

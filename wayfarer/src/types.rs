//! Core value types shared across the engine: planned steps, attempt
//! outcomes, and the task submission boundary.

use crate::capture::CaptureRecord;
use crate::drivers::ScreenshotResult;
use crate::snapshot::PageSnapshot;
use crate::store::CommitEntry;
use crate::target::TargetDescriptor;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The kind of interaction a planned step asks for.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Click,
    Type,
    Scroll,
    Wait,
    Navigate,
}

impl ActionKind {
    /// Kinds that must leave a visible trace when the driver claims success:
    /// a click that opens or submits something, and navigation. Typing and
    /// scrolling may legitimately change nothing the extraction can see.
    pub fn must_change_page(&self) -> bool {
        matches!(self, ActionKind::Click | ActionKind::Navigate)
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ActionKind::Click => "click",
            ActionKind::Type => "type",
            ActionKind::Scroll => "scroll",
            ActionKind::Wait => "wait",
            ActionKind::Navigate => "navigate",
        };
        write!(f, "{name}")
    }
}

/// One planned unit of work. Immutable once issued by the planner; consumed
/// exactly once by the orchestrator, though it may be reissued after a
/// classified regression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub kind: ActionKind,
    pub target: TargetDescriptor,
    /// Input value for `type` steps
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Ordinal position within the plan that issued this step
    pub index: usize,
}

impl Step {
    pub fn click(target: impl Into<TargetDescriptor>, index: usize) -> Self {
        Self {
            kind: ActionKind::Click,
            target: target.into(),
            value: None,
            index,
        }
    }

    pub fn type_text(
        target: impl Into<TargetDescriptor>,
        value: impl Into<String>,
        index: usize,
    ) -> Self {
        Self {
            kind: ActionKind::Type,
            target: target.into(),
            value: Some(value.into()),
            index,
        }
    }

    pub fn navigate(url: impl Into<String>, index: usize) -> Self {
        Self {
            kind: ActionKind::Navigate,
            target: TargetDescriptor::Url(url.into()),
            value: None,
            index,
        }
    }

    pub fn scroll(index: usize) -> Self {
        Self {
            kind: ActionKind::Scroll,
            target: TargetDescriptor::Point { x: 0.0, y: 0.0 },
            value: None,
            index,
        }
    }

    pub fn wait(index: usize) -> Self {
        Self {
            kind: ActionKind::Wait,
            target: TargetDescriptor::Text(String::new()),
            value: None,
            index,
        }
    }
}

/// Which cascade layer produced the result of an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverLayer {
    Layer1,
    Layer2,
    Layer3,
    /// All layers exhausted without success
    None,
}

impl std::fmt::Display for DriverLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DriverLayer::Layer1 => "layer1",
            DriverLayer::Layer2 => "layer2",
            DriverLayer::Layer3 => "layer3",
            DriverLayer::None => "none",
        };
        write!(f, "{name}")
    }
}

/// One failed attempt inside the cascade, kept for diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptFailure {
    pub layer: DriverLayer,
    pub strategy: String,
    pub error: String,
    /// Definite negative result rather than a timeout
    pub definite: bool,
    pub elapsed_ms: u64,
}

/// Result of one executor run over a single step. Owned by the orchestrator
/// for the duration of that step; only derived records outlive it.
#[derive(Debug, Clone)]
pub struct ActionOutcome {
    /// The layer that succeeded, or `None` when the cascade was exhausted
    pub driver: DriverLayer,
    /// Name of the winning strategy within that layer
    pub strategy: Option<String>,
    pub elapsed: Duration,
    /// Ordered per-layer attempt failures accumulated before success
    pub failures: Vec<AttemptFailure>,
    pub before: PageSnapshot,
    pub after: PageSnapshot,
    /// Full-page image of the settled after state, when one could be taken
    pub after_image: Option<ScreenshotResult>,
}

impl ActionOutcome {
    pub fn succeeded(&self) -> bool {
        self.driver != DriverLayer::None
    }
}

/// Lifecycle of one task execution. `Idle` exists only before the context is
/// created; a stored context starts at `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Idle,
    Running,
    Completed,
    Stuck,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Stuck | TaskStatus::Failed
        )
    }

    /// Terminal states are absorbing; everything else moves forward only.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Idle, TaskStatus::Running)
                | (TaskStatus::Running, TaskStatus::Completed)
                | (TaskStatus::Running, TaskStatus::Stuck)
                | (TaskStatus::Running, TaskStatus::Failed)
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TaskStatus::Idle => "idle",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Stuck => "stuck",
            TaskStatus::Failed => "failed",
        };
        write!(f, "{name}")
    }
}

/// What a caller submits to start a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRequest {
    pub task_description: String,
    pub start_url: String,
    pub app_identifier: String,
}

/// Synchronous exit report for one task run: final status, the full capture
/// list, and the commit history.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskReport {
    pub task_id: String,
    pub status: TaskStatus,
    pub steps_completed: usize,
    pub capture_list: Vec<CaptureRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub commits: Vec<CommitEntry>,
}

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::info;
use wayfarer::{Engine, TaskReport, TaskRequest, TaskStatus};

enum TaskState {
    Running,
    Done(TaskReport),
}

struct TaskHandle {
    cancel: CancellationToken,
    state: TaskState,
}

/// What a status query sees: either the live store view of a task still in
/// flight, or the finished report.
pub enum TaskView {
    Running {
        status: TaskStatus,
        steps_completed: usize,
    },
    Finished(TaskReport),
}

/// Owns one engine run per submitted task. Submission spawns the run and
/// returns immediately; the report lands in the registry when the run exits.
pub struct TaskManager {
    engine: Arc<Engine>,
    tasks: RwLock<HashMap<String, TaskHandle>>,
}

impl TaskManager {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            tasks: RwLock::new(HashMap::new()),
        }
    }

    /// Register and start a task, returning its id.
    pub async fn submit(self: &Arc<Self>, request: TaskRequest) -> String {
        let task_id = uuid::Uuid::new_v4().to_string();
        let cancel = CancellationToken::new();

        self.tasks.write().await.insert(
            task_id.clone(),
            TaskHandle {
                cancel: cancel.clone(),
                state: TaskState::Running,
            },
        );
        info!(task_id = %task_id, "task accepted");

        let manager = self.clone();
        let id = task_id.clone();
        tokio::spawn(async move {
            let report = manager.engine.submit_task(&id, &request, cancel).await;
            info!(task_id = %id, status = %report.status, steps = report.steps_completed, "task finished");
            if let Some(handle) = manager.tasks.write().await.get_mut(&id) {
                handle.state = TaskState::Done(report);
            }
        });

        task_id
    }

    /// Current view of a task, or `None` for an unknown id. While the run is
    /// in flight the status comes from the context store, so a poller sees
    /// step progress without waiting for the exit report.
    pub async fn view(&self, task_id: &str) -> Option<TaskView> {
        {
            let tasks = self.tasks.read().await;
            let handle = tasks.get(task_id)?;
            if let TaskState::Done(report) = &handle.state {
                return Some(TaskView::Finished(report.clone()));
            }
        }

        match self.engine.store().read(task_id).await {
            Ok((context, _version)) => Some(TaskView::Running {
                status: context.status,
                steps_completed: context.step_index,
            }),
            // Registered but not yet in the store; the run is still opening
            // the start page.
            Err(_) => Some(TaskView::Running {
                status: TaskStatus::Running,
                steps_completed: 0,
            }),
        }
    }

    /// Request cooperative cancellation. Returns `None` for an unknown id,
    /// `Some(false)` when the task already finished.
    pub async fn cancel(&self, task_id: &str) -> Option<bool> {
        let tasks = self.tasks.read().await;
        let handle = tasks.get(task_id)?;
        match &handle.state {
            TaskState::Running => {
                info!(task_id = %task_id, "cancellation requested");
                handle.cancel.cancel();
                Some(true)
            }
            TaskState::Done(_) => Some(false),
        }
    }
}

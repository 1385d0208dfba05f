//! Versioned task context store.
//!
//! The store is the single authority on task state. Writers read a context
//! at some version, build a [`ContextMutation`], and commit it back with the
//! version they read; a commit against any other version is rejected and the
//! writer must re-read. Mutations are declarative so the store alone decides
//! how state evolves: history is append-only and bounded, capture records
//! only accumulate, and a terminal status rejects every later commit.
//!
//! A remote mirror, when configured, receives each committed context on a
//! detached task. Mirror trouble is logged and dropped; it never delays or
//! fails the commit that triggered it.

use crate::capture::CaptureRecord;
use crate::config::StoreConfig;
use crate::errors::EngineError;
use crate::snapshot::PageSnapshot;
use crate::types::TaskStatus;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, warn};

/// Everything the engine knows about one task.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskContext {
    pub task_id: String,
    pub status: TaskStatus,
    /// Index of the next plan step to execute
    pub step_index: usize,
    /// Monotonic commit counter, bumped by the store on every accepted commit
    pub version: u64,
    /// Recent page snapshots, oldest first, bounded by the store
    pub history: Vec<PageSnapshot>,
    pub captures: Vec<CaptureRecord>,
    /// Digest of the most recently persisted capture
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_persisted_digest: Option<String>,
}

impl TaskContext {
    fn new(task_id: &str, initial: PageSnapshot) -> Self {
        Self {
            task_id: task_id.to_string(),
            status: TaskStatus::Running,
            step_index: 0,
            version: 1,
            history: vec![initial],
            captures: Vec::new(),
            last_persisted_digest: None,
        }
    }

    pub fn latest_snapshot(&self) -> Option<&PageSnapshot> {
        self.history.last()
    }
}

/// Declarative change set applied by the store on commit.
///
/// Fields left `None` leave the corresponding state untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextMutation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub append_snapshot: Option<PageSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub add_capture: Option<CaptureRecord>,
}

impl ContextMutation {
    fn describe(&self) -> String {
        let mut parts = Vec::new();
        if self.append_snapshot.is_some() {
            parts.push("snapshot".to_string());
        }
        if let Some(index) = self.step_index {
            parts.push(format!("step:{index}"));
        }
        if let Some(status) = self.status {
            parts.push(format!("status:{status}"));
        }
        if self.add_capture.is_some() {
            parts.push("capture".to_string());
        }
        if parts.is_empty() {
            "noop".to_string()
        } else {
            parts.join("+")
        }
    }
}

/// Result of a commit attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Accepted { new_version: u64 },
    /// The caller's version was stale; re-read at `current_version` and retry
    Rejected { current_version: u64 },
}

/// One accepted commit, kept for audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitEntry {
    pub version: u64,
    pub at: DateTime<Utc>,
    pub label: String,
}

/// Broadcast to subscribers after every accepted commit.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextEvent {
    pub task_id: String,
    pub version: u64,
    pub status: TaskStatus,
    pub label: String,
}

/// Receives committed contexts for best-effort replication.
#[async_trait]
pub trait ContextMirror: Send + Sync {
    async fn replicate(&self, context: &TaskContext) -> Result<(), EngineError>;
}

struct TaskEntry {
    context: TaskContext,
    last_commit_at: DateTime<Utc>,
    commit_log: Vec<CommitEntry>,
}

/// In-memory authoritative store with optional remote mirroring.
pub struct ContextStore {
    config: StoreConfig,
    tasks: RwLock<HashMap<String, TaskEntry>>,
    events: broadcast::Sender<ContextEvent>,
    mirror: Option<Arc<dyn ContextMirror>>,
}

impl ContextStore {
    pub fn new(config: StoreConfig) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            config,
            tasks: RwLock::new(HashMap::new()),
            events,
            mirror: None,
        }
    }

    pub fn with_mirror(mut self, mirror: Arc<dyn ContextMirror>) -> Self {
        self.mirror = Some(mirror);
        self
    }

    /// Register a task at version 1 with its initial snapshot.
    pub async fn create(
        &self,
        task_id: &str,
        initial: PageSnapshot,
    ) -> Result<TaskContext, EngineError> {
        let mut tasks = self.tasks.write().await;
        if tasks.contains_key(task_id) {
            return Err(EngineError::Internal(format!(
                "task {task_id} is already registered"
            )));
        }
        let context = TaskContext::new(task_id, initial);
        let entry = TaskEntry {
            context: context.clone(),
            last_commit_at: Utc::now(),
            commit_log: vec![CommitEntry {
                version: context.version,
                at: Utc::now(),
                label: "created".to_string(),
            }],
        };
        tasks.insert(task_id.to_string(), entry);
        drop(tasks);

        self.publish(&context, "created");
        self.replicate(&context);
        Ok(context)
    }

    /// Read a task's context together with its current version.
    pub async fn read(&self, task_id: &str) -> Result<(TaskContext, u64), EngineError> {
        let tasks = self.tasks.read().await;
        let entry = tasks
            .get(task_id)
            .ok_or_else(|| EngineError::UnknownTask(task_id.to_string()))?;
        Ok((entry.context.clone(), entry.context.version))
    }

    /// Commit a mutation against the version the caller last read.
    ///
    /// Returns [`CommitOutcome::Rejected`] on a version mismatch. Commits
    /// against a task already in a terminal status fail outright, as does a
    /// status change the lifecycle does not allow.
    pub async fn commit(
        &self,
        task_id: &str,
        expected_version: u64,
        mutation: ContextMutation,
    ) -> Result<CommitOutcome, EngineError> {
        let label = mutation.describe();
        let committed = {
            let mut tasks = self.tasks.write().await;
            let entry = tasks
                .get_mut(task_id)
                .ok_or_else(|| EngineError::UnknownTask(task_id.to_string()))?;

            if entry.context.version != expected_version {
                debug!(
                    task_id,
                    expected_version,
                    current_version = entry.context.version,
                    "rejected stale commit"
                );
                return Ok(CommitOutcome::Rejected {
                    current_version: entry.context.version,
                });
            }
            if entry.context.status.is_terminal() {
                return Err(EngineError::InvalidTransition(format!(
                    "task {task_id} is already {}",
                    entry.context.status
                )));
            }
            if let Some(next) = mutation.status {
                if next != entry.context.status && !entry.context.status.can_transition_to(next) {
                    return Err(EngineError::InvalidTransition(format!(
                        "task {task_id} cannot move from {} to {next}",
                        entry.context.status
                    )));
                }
            }

            self.apply(&mut entry.context, mutation);
            entry.context.version += 1;
            entry.last_commit_at = Utc::now();
            entry.commit_log.push(CommitEntry {
                version: entry.context.version,
                at: entry.last_commit_at,
                label: label.clone(),
            });
            entry.context.clone()
        };

        debug!(task_id, version = committed.version, %label, "committed context");
        self.publish(&committed, &label);
        self.replicate(&committed);
        Ok(CommitOutcome::Accepted {
            new_version: committed.version,
        })
    }

    fn apply(&self, context: &mut TaskContext, mutation: ContextMutation) {
        if let Some(snapshot) = mutation.append_snapshot {
            context.history.push(snapshot);
            while context.history.len() > self.config.history_limit {
                context.history.remove(0);
            }
        }
        if let Some(index) = mutation.step_index {
            context.step_index = index;
        }
        if let Some(status) = mutation.status {
            context.status = status;
        }
        if let Some(capture) = mutation.add_capture {
            context.last_persisted_digest = Some(capture.digest.clone());
            context.captures.push(capture);
        }
    }

    /// Subscribe to commit notifications for all tasks.
    pub fn subscribe(&self) -> broadcast::Receiver<ContextEvent> {
        self.events.subscribe()
    }

    /// Whether a reader's view of a task has drifted too far to trust.
    ///
    /// A view is desynchronized once the store has moved more than the
    /// configured version gap past it, or once it has gone unrefreshed
    /// longer than the staleness window.
    pub async fn is_desynced(
        &self,
        task_id: &str,
        seen_version: u64,
        last_synced_at: DateTime<Utc>,
    ) -> Result<bool, EngineError> {
        let tasks = self.tasks.read().await;
        let entry = tasks
            .get(task_id)
            .ok_or_else(|| EngineError::UnknownTask(task_id.to_string()))?;
        let gap = entry.context.version.saturating_sub(seen_version);
        let staleness = Utc::now().signed_duration_since(last_synced_at);
        Ok(gap > self.config.desync_version_gap
            || staleness.num_seconds() > self.config.desync_staleness_secs)
    }

    /// Audit log of accepted commits for one task.
    pub async fn commit_log(&self, task_id: &str) -> Result<Vec<CommitEntry>, EngineError> {
        let tasks = self.tasks.read().await;
        let entry = tasks
            .get(task_id)
            .ok_or_else(|| EngineError::UnknownTask(task_id.to_string()))?;
        Ok(entry.commit_log.clone())
    }

    /// Drop a task's context, returning its final state if it existed.
    pub async fn remove(&self, task_id: &str) -> Option<TaskContext> {
        let mut tasks = self.tasks.write().await;
        tasks.remove(task_id).map(|entry| entry.context)
    }

    fn publish(&self, context: &TaskContext, label: &str) {
        // No receivers is not an error.
        let _ = self.events.send(ContextEvent {
            task_id: context.task_id.clone(),
            version: context.version,
            status: context.status,
            label: label.to_string(),
        });
    }

    fn replicate(&self, context: &TaskContext) {
        let Some(mirror) = self.mirror.clone() else {
            return;
        };
        let context = context.clone();
        let deadline = Duration::from_millis(self.config.mirror_timeout_ms);
        tokio::spawn(async move {
            match tokio::time::timeout(deadline, mirror.replicate(&context)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(
                        task_id = %context.task_id,
                        version = context.version,
                        error = %e,
                        "context mirror rejected replication"
                    );
                }
                Err(_) => {
                    warn!(
                        task_id = %context.task_id,
                        version = context.version,
                        timeout_ms = deadline.as_millis() as u64,
                        "context mirror timed out"
                    );
                }
            }
        });
    }
}

/// Mirror that PUTs each committed context to a remote HTTP endpoint.
pub struct HttpContextMirror {
    client: reqwest::Client,
    base_url: String,
    bearer_token: Option<String>,
}

impl HttpContextMirror {
    pub fn new(
        base_url: impl Into<String>,
        bearer_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, EngineError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EngineError::MirrorError(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            bearer_token,
        })
    }
}

#[async_trait]
impl ContextMirror for HttpContextMirror {
    async fn replicate(&self, context: &TaskContext) -> Result<(), EngineError> {
        let url = format!("{}/context/{}", self.base_url, context.task_id);
        let mut request = self.client.put(&url).json(context);
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .await
            .map_err(|e| EngineError::MirrorError(e.to_string()))?;
        response
            .error_for_status()
            .map_err(|e| EngineError::MirrorError(e.to_string()))?;
        Ok(())
    }
}

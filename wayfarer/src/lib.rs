//! Self-correcting execution and validation engine for live web apps.
//!
//! The engine takes a natural-language task, asks a [`Planner`] for steps,
//! and drives them through a three-layer action cascade against an
//! [`AutomationDriver`]. Every step is validated against before/after page
//! snapshots, scored, and committed to a versioned [`ContextStore`];
//! states worth keeping are handed to a [`CaptureSink`] together with a
//! screenshot. Drivers, planner, and sink are all traits, so the engine
//! runs the same against a browser bridge, a remote agent, or the scripted
//! fakes used in tests.

pub mod capture;
pub mod config;
pub mod drivers;
pub mod errors;
pub mod executor;
pub mod orchestrator;
pub mod planner;
pub mod scorer;
pub mod snapshot;
pub mod store;
pub mod target;
pub mod types;
pub mod validator;

#[cfg(test)]
mod tests;

pub use capture::{CaptureRecord, CaptureSink, DiscardSink};
pub use config::{
    EngineConfig, ExecutorConfig, OrchestratorConfig, StoreConfig, ValidatorConfig,
};
pub use drivers::{
    AutomationDriver, ButtonRegion, ElementRef, ScreenshotResult, SearchScope, TextRegion,
    VisualDriver,
};
pub use errors::EngineError;
pub use executor::{ActionExecutor, RiskTier, StrategyDescriptor, StrategyKind};
pub use orchestrator::WorkflowOrchestrator;
pub use planner::{PlanContext, Planner};
pub use scorer::{CaptureDecision, CaptureScorer, ScoreTable};
pub use snapshot::{content_digest, OverlayKind, PageContent, PageSnapshot, SnapshotDelta};
pub use store::{
    CommitEntry, CommitOutcome, ContextEvent, ContextMirror, ContextMutation, ContextStore,
    HttpContextMirror, TaskContext,
};
pub use target::TargetDescriptor;
pub use types::{
    ActionKind, ActionOutcome, AttemptFailure, DriverLayer, Step, TaskReport, TaskRequest,
    TaskStatus,
};
pub use validator::{StateValidator, ValidationVerdict, Verdict};

use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Entry point tying the drivers, planner, store, and sink together.
///
/// Build one with [`Engine::new`], optionally attach a capture sink and a
/// context mirror, then submit tasks. The engine itself is cheap to share;
/// whether concurrent tasks are safe depends on the driver behind it.
pub struct Engine {
    primary: Arc<dyn AutomationDriver>,
    recovery: Arc<dyn AutomationDriver>,
    visual: Arc<dyn VisualDriver>,
    planner: Arc<dyn Planner>,
    sink: Arc<dyn CaptureSink>,
    store: Arc<ContextStore>,
    config: EngineConfig,
}

impl Engine {
    /// Wire an engine from its capabilities. The same driver may serve as
    /// both primary and recovery when only one automation backend exists.
    pub fn new(
        primary: Arc<dyn AutomationDriver>,
        recovery: Arc<dyn AutomationDriver>,
        visual: Arc<dyn VisualDriver>,
        planner: Arc<dyn Planner>,
        config: EngineConfig,
    ) -> Self {
        let store = Arc::new(ContextStore::new(config.store.clone()));
        Self {
            primary,
            recovery,
            visual,
            planner,
            sink: Arc::new(DiscardSink),
            store,
            config,
        }
    }

    /// Attach a capture sink. Without one, captures are recorded in the
    /// task context but their images are dropped.
    pub fn with_sink(mut self, sink: Arc<dyn CaptureSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Attach a remote context mirror. Call before submitting any task;
    /// this rebuilds the store.
    pub fn with_mirror(mut self, mirror: Arc<dyn ContextMirror>) -> Self {
        self.store = Arc::new(ContextStore::new(self.config.store.clone()).with_mirror(mirror));
        self
    }

    pub fn store(&self) -> Arc<ContextStore> {
        self.store.clone()
    }

    /// Commit notifications for every task this engine runs.
    pub fn subscribe(&self) -> broadcast::Receiver<ContextEvent> {
        self.store.subscribe()
    }

    /// Run a task under a fresh id and return its exit report.
    #[instrument(skip(self, request))]
    pub async fn submit(&self, request: &TaskRequest) -> TaskReport {
        let task_id = uuid::Uuid::new_v4().to_string();
        self.submit_task(&task_id, request, CancellationToken::new())
            .await
    }

    /// Run a task under a caller-chosen id, honoring the given cancellation
    /// token between steps.
    #[instrument(skip(self, request, cancel))]
    pub async fn submit_task(
        &self,
        task_id: &str,
        request: &TaskRequest,
        cancel: CancellationToken,
    ) -> TaskReport {
        let executor = ActionExecutor::new(
            self.primary.clone(),
            self.recovery.clone(),
            self.visual.clone(),
            self.config.executor.clone(),
        );
        let orchestrator = WorkflowOrchestrator::new(
            executor,
            StateValidator::new(self.config.validator.clone()),
            CaptureScorer::new(self.config.scorer.clone()),
            self.planner.clone(),
            self.store.clone(),
            self.sink.clone(),
            self.config.orchestrator.clone(),
        );
        orchestrator.run(task_id, request, cancel).await
    }
}

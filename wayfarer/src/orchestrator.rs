//! Task orchestration.
//!
//! One orchestrator run takes a task from its start URL to a terminal
//! status: plan, then for each step act, validate, score, and commit, with
//! bounded retries at every level. The loop never panics its way out and
//! never returns an error; whatever happens is folded into the final
//! [`TaskReport`].
//!
//! Budgets, not hope, end a bad run: a step that keeps failing hits the
//! retry ceiling (`stuck`), a run that keeps executing hits the step budget
//! (`failed`), and a commit that keeps racing hits the commit retry limit
//! (`failed`). Cancellation is honored between steps only, so one step's
//! side effects are never half-applied.

use crate::capture::{CaptureRecord, CaptureSink};
use crate::config::OrchestratorConfig;
use crate::errors::EngineError;
use crate::executor::ActionExecutor;
use crate::planner::{plan_with_timeout, PlanContext, Planner};
use crate::scorer::CaptureScorer;
use crate::store::{CommitOutcome, ContextMutation, ContextStore, TaskContext};
use crate::types::{ActionOutcome, Step, TaskReport, TaskRequest, TaskStatus};
use crate::validator::{StateValidator, Verdict};
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Drives one task at a time through the plan/act/validate/score loop.
pub struct WorkflowOrchestrator {
    executor: ActionExecutor,
    validator: StateValidator,
    scorer: CaptureScorer,
    planner: Arc<dyn Planner>,
    store: Arc<ContextStore>,
    sink: Arc<dyn CaptureSink>,
    config: OrchestratorConfig,
}

/// Mutable per-run bookkeeping that lives outside the store.
struct RunState {
    plan: VecDeque<Step>,
    completed: Vec<Step>,
    steps_completed: usize,
    /// Executor invocations, retries included; bounded by the step budget
    steps_executed: usize,
    /// Consecutive failures of the step currently at the front of the plan
    retry_count: u32,
    last_transition_digest: Option<String>,
    final_url: Option<String>,
}

impl RunState {
    fn new(final_url: Option<String>) -> Self {
        Self {
            plan: VecDeque::new(),
            completed: Vec::new(),
            steps_completed: 0,
            steps_executed: 0,
            retry_count: 0,
            last_transition_digest: None,
            final_url,
        }
    }
}

impl WorkflowOrchestrator {
    pub fn new(
        executor: ActionExecutor,
        validator: StateValidator,
        scorer: CaptureScorer,
        planner: Arc<dyn Planner>,
        store: Arc<ContextStore>,
        sink: Arc<dyn CaptureSink>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            executor,
            validator,
            scorer,
            planner,
            store,
            sink,
            config,
        }
    }

    /// Run the task to completion. Infallible by contract: every failure
    /// mode ends as a terminal status inside the report.
    #[instrument(skip(self, request, cancel))]
    pub async fn run(
        &self,
        task_id: &str,
        request: &TaskRequest,
        cancel: CancellationToken,
    ) -> TaskReport {
        let mut state = RunState::new(None);
        let (status, error) = match self.drive(task_id, request, &cancel, &mut state).await {
            Ok(exit) => exit,
            Err(e) => {
                warn!(error = %e, "task run aborted on engine error");
                (TaskStatus::Failed, Some(e.to_string()))
            }
        };
        self.finish(task_id, status, error, &state).await
    }

    async fn drive(
        &self,
        task_id: &str,
        request: &TaskRequest,
        cancel: &CancellationToken,
        state: &mut RunState,
    ) -> Result<(TaskStatus, Option<String>), EngineError> {
        let initial = self.executor.bootstrap(&request.start_url).await?;
        state.final_url = initial.url.clone();
        self.store.create(task_id, initial.clone()).await?;

        let planner_deadline = Duration::from_millis(self.config.planner_timeout_ms);
        let plan_context = PlanContext {
            completed_steps: Vec::new(),
            recent_snapshots: vec![initial.clone()],
            revision_reason: None,
        };
        let steps = plan_with_timeout(
            self.planner.as_ref(),
            &request.task_description,
            &initial,
            &plan_context,
            planner_deadline,
        )
        .await
        .map_err(|e| EngineError::PlannerError(format!("no initial plan: {e}")))?;

        if steps.is_empty() {
            info!("planner returned an empty plan; nothing to do");
            return Ok((TaskStatus::Completed, None));
        }
        info!(steps = steps.len(), "initial plan ready");
        state.plan = steps.into();

        loop {
            let Some(step) = state.plan.front().cloned() else {
                return Ok((TaskStatus::Completed, None));
            };

            if cancel.is_cancelled() {
                info!("cancellation observed between steps");
                return Ok((TaskStatus::Failed, Some("cancelled".to_string())));
            }
            if state.steps_executed >= self.config.step_budget {
                return Ok((
                    TaskStatus::Failed,
                    Some(format!(
                        "step budget of {} exhausted with {} plan steps left",
                        self.config.step_budget,
                        state.plan.len()
                    )),
                ));
            }
            state.steps_executed += 1;

            let outcome = self.executor.run(&step).await?;
            if let Some(url) = &outcome.after.url {
                state.final_url = Some(url.clone());
            }

            if !outcome.succeeded() {
                let summary = describe_exhaustion(&outcome);
                warn!(step = step.index, %summary, "cascade exhausted");
                self.commit_with_retry(task_id, |_| ContextMutation {
                    append_snapshot: Some(outcome.after.clone()),
                    ..Default::default()
                })
                .await?;
                if let Some(exit) = self.register_step_failure(state, &step, &summary) {
                    return Ok(exit);
                }
                continue;
            }

            let (ctx, _) = self.store.read(task_id).await?;
            let verdict = self.validator.classify(&step, &outcome, &ctx.history);
            let decision = self.scorer.decide(
                &step,
                &outcome,
                verdict.verdict,
                state.last_transition_digest.as_deref(),
                ctx.last_persisted_digest.as_deref(),
            );
            info!(
                step = step.index,
                verdict = %verdict.verdict,
                reward = decision.reward,
                persist = decision.persist,
                "step validated"
            );

            let capture = if decision.persist {
                self.persist_capture(task_id, request, &step, &outcome, &ctx, decision.reward, verdict.verdict)
                    .await?
            } else {
                None
            };

            let progresses = verdict.verdict.allows_progress();
            self.commit_with_retry(task_id, |fresh| ContextMutation {
                append_snapshot: Some(outcome.after.clone()),
                step_index: progresses.then_some(fresh.step_index + 1),
                status: None,
                add_capture: capture.clone(),
            })
            .await?;
            state.last_transition_digest = Some(outcome.after.digest.clone());

            if progresses {
                state.retry_count = 0;
                state.steps_completed += 1;
                if let Some(done) = state.plan.pop_front() {
                    state.completed.push(done);
                }
                continue;
            }

            if let Some(exit) = self.register_step_failure(state, &step, &verdict.rationale) {
                return Ok(exit);
            }
            if verdict.verdict == Verdict::Regression && self.config.replan_on_regression {
                self.replan(task_id, request, state, &verdict.rationale).await?;
            }
        }
    }

    /// Count a failed attempt of the current step against the retry ceiling.
    fn register_step_failure(
        &self,
        state: &mut RunState,
        step: &Step,
        reason: &str,
    ) -> Option<(TaskStatus, Option<String>)> {
        state.retry_count += 1;
        if state.retry_count >= self.config.step_retry_limit {
            return Some((
                TaskStatus::Stuck,
                Some(format!(
                    "step {} ({}) failed {} consecutive attempts; last: {reason}",
                    step.index, step.kind, state.retry_count
                )),
            ));
        }
        debug!(
            step = step.index,
            attempt = state.retry_count,
            limit = self.config.step_retry_limit,
            "step will be retried"
        );
        None
    }

    /// Ask the planner for a revised plan after a regression. A planner that
    /// errors out or returns nothing leaves the current plan in place; the
    /// retry ceiling still bounds the run.
    async fn replan(
        &self,
        task_id: &str,
        request: &TaskRequest,
        state: &mut RunState,
        reason: &str,
    ) -> Result<(), EngineError> {
        let (ctx, _) = self.store.read(task_id).await?;
        let Some(current) = ctx.latest_snapshot().cloned() else {
            return Ok(());
        };
        let plan_context = PlanContext {
            completed_steps: state.completed.clone(),
            recent_snapshots: ctx.history.clone(),
            revision_reason: Some(reason.to_string()),
        };
        let deadline = Duration::from_millis(self.config.planner_timeout_ms);
        match plan_with_timeout(
            self.planner.as_ref(),
            &request.task_description,
            &current,
            &plan_context,
            deadline,
        )
        .await
        {
            Ok(steps) if steps.is_empty() => {
                warn!("planner declined to revise; keeping current plan");
            }
            Ok(steps) => {
                info!(steps = steps.len(), "revised plan replaces remaining steps");
                state.plan = steps.into();
                state.retry_count = 0;
            }
            Err(e) => {
                warn!(error = %e, "replanning failed; keeping current plan");
            }
        }
        Ok(())
    }

    /// Hand the after-image to the sink and build the capture record. Sink
    /// trouble skips the record unless the sink is required.
    async fn persist_capture(
        &self,
        task_id: &str,
        request: &TaskRequest,
        step: &Step,
        outcome: &ActionOutcome,
        ctx: &TaskContext,
        reward: f64,
        verdict: Verdict,
    ) -> Result<Option<CaptureRecord>, EngineError> {
        let Some(image) = &outcome.after_image else {
            warn!(step = step.index, "no after image available; capture skipped");
            return Ok(None);
        };
        let mut record = CaptureRecord {
            task_id: task_id.to_string(),
            app_identifier: request.app_identifier.clone(),
            step_index: ctx.step_index,
            action_kind: step.kind,
            reward,
            verdict,
            timestamp: Utc::now(),
            detected_overlay_kind: outcome.after.primary_overlay(),
            digest: outcome.after.digest.clone(),
            stored_path: None,
        };
        match self.sink.persist(&record, image).await {
            Ok(path) => {
                record.stored_path = path;
                Ok(Some(record))
            }
            Err(e) if self.config.require_capture_sink => Err(EngineError::CaptureSinkError(
                format!("required sink refused capture: {e}"),
            )),
            Err(e) => {
                warn!(error = %e, "capture sink failed; state not persisted");
                Ok(None)
            }
        }
    }

    /// Commit a mutation built from a freshly read context, retrying on
    /// version races up to the configured limit.
    async fn commit_with_retry<F>(&self, task_id: &str, build: F) -> Result<u64, EngineError>
    where
        F: Fn(&TaskContext) -> ContextMutation,
    {
        for attempt in 0..=self.config.commit_retry_limit {
            if attempt > 0 {
                debug!(attempt, "re-reading context after commit rejection");
            }
            let (ctx, version) = self.store.read(task_id).await?;
            match self.store.commit(task_id, version, build(&ctx)).await? {
                CommitOutcome::Accepted { new_version } => return Ok(new_version),
                CommitOutcome::Rejected { .. } => continue,
            }
        }
        Err(EngineError::Internal(format!(
            "commit for task {task_id} still rejected after {} retries",
            self.config.commit_retry_limit
        )))
    }

    /// Record the terminal status and assemble the exit report.
    async fn finish(
        &self,
        task_id: &str,
        status: TaskStatus,
        error: Option<String>,
        state: &RunState,
    ) -> TaskReport {
        if let Err(e) = self
            .commit_with_retry(task_id, |_| ContextMutation {
                status: Some(status),
                ..Default::default()
            })
            .await
        {
            // The task may have died before its context was registered.
            debug!(error = %e, "terminal status not recorded in store");
        }

        let capture_list = match self.store.read(task_id).await {
            Ok((ctx, _)) => ctx.captures,
            Err(_) => Vec::new(),
        };
        let commits = self.store.commit_log(task_id).await.unwrap_or_default();

        info!(
            %status,
            steps = state.steps_completed,
            captures = capture_list.len(),
            "task finished"
        );
        TaskReport {
            task_id: task_id.to_string(),
            status,
            steps_completed: state.steps_completed,
            capture_list,
            final_url: state.final_url.clone(),
            error,
            commits,
        }
    }
}

fn describe_exhaustion(outcome: &ActionOutcome) -> String {
    match outcome.failures.last() {
        Some(last) => format!(
            "all drivers declined after {} attempts; last ({} {}): {}",
            outcome.failures.len(),
            last.layer,
            last.strategy,
            last.error
        ),
        None => "all drivers declined".to_string(),
    }
}

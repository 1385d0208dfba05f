//! Action execution cascade.
//!
//! Three layers, engaged strictly in order. Layer 1 tries the ordered
//! strategy table against the top document. Layer 2 activates only after
//! enough *definite* layer 1 misses (timeouts do not count) and retries
//! through the recovery driver with frame piercing. Layer 3 gives up on the
//! document entirely and works from pixels.
//!
//! The cascade never turns an action failure into an error: a step that
//! exhausts every layer comes back as an [`ActionOutcome`] with
//! [`DriverLayer::None`] and the accumulated failure list. `Err` is reserved
//! for infrastructure trouble, a page that cannot even be observed.

mod recovery;
mod strategies;
mod visual;

pub use strategies::{layer1_strategies, RiskTier, StrategyDescriptor, StrategyKind};

use crate::config::ExecutorConfig;
use crate::drivers::{AutomationDriver, VisualDriver};
use crate::errors::EngineError;
use crate::snapshot::PageSnapshot;
use crate::types::{ActionKind, ActionOutcome, AttemptFailure, DriverLayer, Step};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// Drives single steps against the page through the three-layer cascade.
pub struct ActionExecutor {
    primary: Arc<dyn AutomationDriver>,
    recovery: Arc<dyn AutomationDriver>,
    visual: Arc<dyn VisualDriver>,
    config: ExecutorConfig,
}

impl ActionExecutor {
    pub fn new(
        primary: Arc<dyn AutomationDriver>,
        recovery: Arc<dyn AutomationDriver>,
        visual: Arc<dyn VisualDriver>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            primary,
            recovery,
            visual,
            config,
        }
    }

    /// Open the task's start URL and observe the initial page state.
    #[instrument(skip(self))]
    pub async fn bootstrap(&self, url: &str) -> Result<PageSnapshot, EngineError> {
        self.primary.navigate(url).await?;
        let deadline = Duration::from_millis(self.config.quiescence_timeout_ms);
        if !self.primary.await_quiescence(deadline).await? {
            tokio::time::sleep(Duration::from_millis(self.config.navigation_fallback_wait_ms))
                .await;
        }
        self.observe().await
    }

    /// Execute one step through the cascade.
    #[instrument(skip(self, step), fields(kind = %step.kind, target = %step.target))]
    pub async fn run(&self, step: &Step) -> Result<ActionOutcome, EngineError> {
        let started = Instant::now();
        let before = self.observe().await?;

        if step.kind == ActionKind::Wait {
            return self.run_wait(before, started).await;
        }

        let mut failures = Vec::new();

        for descriptor in layer1_strategies(step.kind, &self.config) {
            let attempt_started = Instant::now();
            let attempt = tokio::time::timeout(
                descriptor.timeout,
                strategies::run_strategy(
                    self.primary.as_ref(),
                    step,
                    descriptor.kind,
                    descriptor.timeout,
                    &self.config,
                ),
            )
            .await;
            match attempt {
                Ok(Ok(())) => {
                    info!(strategy = descriptor.kind.label(), "layer 1 strategy landed");
                    return self
                        .finish(
                            step,
                            before,
                            DriverLayer::Layer1,
                            descriptor.kind.label(),
                            failures,
                            started,
                        )
                        .await;
                }
                Ok(Err(e)) => {
                    debug!(strategy = descriptor.kind.label(), error = %e, "layer 1 strategy missed");
                    record(&mut failures, DriverLayer::Layer1, descriptor.kind.label(), &e, attempt_started);
                }
                Err(_) => {
                    let e = EngineError::Timeout(format!(
                        "no result within {}ms",
                        descriptor.timeout.as_millis()
                    ));
                    debug!(strategy = descriptor.kind.label(), "layer 1 strategy timed out");
                    record(&mut failures, DriverLayer::Layer1, descriptor.kind.label(), &e, attempt_started);
                }
            }
        }

        let definite = failures.iter().filter(|f| f.definite).count();
        if definite >= self.config.layer2_activation_failures {
            let attempt_started = Instant::now();
            match recovery::run(self.recovery.as_ref(), step, &self.config).await {
                Ok(label) => {
                    info!(strategy = label, "layer 2 recovery landed");
                    return self
                        .finish(step, before, DriverLayer::Layer2, label, failures, started)
                        .await;
                }
                Err(e) => {
                    debug!(error = %e, "layer 2 recovery missed");
                    record(&mut failures, DriverLayer::Layer2, "frame_pierce", &e, attempt_started);
                }
            }

            let attempt_started = Instant::now();
            match visual::run(self.primary.as_ref(), self.visual.as_ref(), step, &self.config).await
            {
                Ok(label) => {
                    info!(strategy = label, "layer 3 visual fallback landed");
                    return self
                        .finish(step, before, DriverLayer::Layer3, label, failures, started)
                        .await;
                }
                Err(e) => {
                    debug!(error = %e, "layer 3 visual fallback missed");
                    record(&mut failures, DriverLayer::Layer3, "visual", &e, attempt_started);
                }
            }
        } else {
            debug!(
                definite,
                required = self.config.layer2_activation_failures,
                "not enough definite misses to justify recovery"
            );
        }

        warn!(
            failures = failures.len(),
            "cascade exhausted without landing the action"
        );
        let after = self.observe().await?;
        Ok(ActionOutcome {
            driver: DriverLayer::None,
            strategy: None,
            elapsed: started.elapsed(),
            failures,
            before,
            after,
            after_image: None,
        })
    }

    /// A wait step is a deliberate pause: no cascade, just time passing and
    /// a fresh observation afterwards.
    async fn run_wait(
        &self,
        before: PageSnapshot,
        started: Instant,
    ) -> Result<ActionOutcome, EngineError> {
        tokio::time::sleep(Duration::from_millis(self.config.wait_step_ms)).await;
        let after = self.observe().await?;
        let after_image = self.primary.screenshot().await.ok();
        Ok(ActionOutcome {
            driver: DriverLayer::Layer1,
            strategy: Some("wait".to_string()),
            elapsed: started.elapsed(),
            failures: Vec::new(),
            before,
            after,
            after_image,
        })
    }

    /// Settle the page, then assemble the outcome for a landed action.
    async fn finish(
        &self,
        step: &Step,
        before: PageSnapshot,
        driver: DriverLayer,
        strategy: &str,
        failures: Vec<AttemptFailure>,
        started: Instant,
    ) -> Result<ActionOutcome, EngineError> {
        self.settle(step).await?;
        let after = self.observe().await?;
        let after_image = self.primary.screenshot().await.ok();
        Ok(ActionOutcome {
            driver,
            strategy: Some(strategy.to_string()),
            elapsed: started.elapsed(),
            failures,
            before,
            after,
            after_image,
        })
    }

    /// Wait for the page to go quiet before the after snapshot. A page that
    /// never settles is snapshotted anyway; navigations get a grace pause
    /// first because their content is still arriving.
    async fn settle(&self, step: &Step) -> Result<(), EngineError> {
        let deadline = Duration::from_millis(self.config.quiescence_timeout_ms);
        let quiescent = self.primary.await_quiescence(deadline).await?;
        if !quiescent {
            debug!(
                timeout_ms = self.config.quiescence_timeout_ms,
                "page did not reach quiescence before the deadline"
            );
            if step.kind == ActionKind::Navigate {
                tokio::time::sleep(Duration::from_millis(
                    self.config.navigation_fallback_wait_ms,
                ))
                .await;
            }
        }
        Ok(())
    }

    async fn observe(&self) -> Result<PageSnapshot, EngineError> {
        let content = self.primary.page_content().await?;
        Ok(PageSnapshot::from_content(&content))
    }
}

fn record(
    failures: &mut Vec<AttemptFailure>,
    layer: DriverLayer,
    strategy: &str,
    error: &EngineError,
    attempt_started: Instant,
) {
    failures.push(AttemptFailure {
        layer,
        strategy: strategy.to_string(),
        error: error.to_string(),
        definite: error.is_definite_failure(),
        elapsed_ms: attempt_started.elapsed().as_millis() as u64,
    });
}

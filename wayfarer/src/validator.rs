//! State validation: deciding what an action actually did to the page.
//!
//! The executor reports what it *attempted*; the validator compares the
//! before/after snapshots and the task's recent history to say what
//! *happened*. Rules are ordered and the first match wins, so a page that
//! bounced back to an earlier state is reported as a regression even though
//! it also looks like a failed must-change action.

use crate::config::ValidatorConfig;
use crate::snapshot::{PageSnapshot, SnapshotDelta};
use crate::types::{ActionKind, ActionOutcome, Step};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Classification of a single executed step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// The page changed in a way consistent with the action
    Confirmed,
    /// The driver reported success but a must-change action left no trace
    SilentFailure,
    /// The page returned to a recently seen state
    Regression,
    /// A deliberate pause during which the page stayed put
    NoChange,
}

impl Verdict {
    /// Verdicts that count against the step's retry ceiling.
    pub fn is_retryable_failure(&self) -> bool {
        matches!(self, Verdict::SilentFailure | Verdict::Regression)
    }

    /// Verdicts that let the plan advance to the next step.
    pub fn allows_progress(&self) -> bool {
        matches!(self, Verdict::Confirmed | Verdict::NoChange)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Verdict::Confirmed => "confirmed",
            Verdict::SilentFailure => "silent_failure",
            Verdict::Regression => "regression",
            Verdict::NoChange => "no_change",
        };
        write!(f, "{label}")
    }
}

/// A verdict plus the observation that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationVerdict {
    pub verdict: Verdict,
    pub rationale: String,
}

impl ValidationVerdict {
    fn new(verdict: Verdict, rationale: impl Into<String>) -> Self {
        Self {
            verdict,
            rationale: rationale.into(),
        }
    }
}

/// Compares page states around an action and classifies the result.
#[derive(Debug, Clone, Default)]
pub struct StateValidator {
    config: ValidatorConfig,
}

impl StateValidator {
    pub fn new(config: ValidatorConfig) -> Self {
        Self { config }
    }

    /// Classify a completed step against the task's snapshot history.
    ///
    /// `history` holds the snapshots recorded before this step ran, oldest
    /// first. Only the most recent `regression_window` entries participate in
    /// the regression check, and entries equal to the step's own before state
    /// are skipped there: a page that never moved is not a page that bounced
    /// back.
    pub fn classify(
        &self,
        step: &Step,
        outcome: &ActionOutcome,
        history: &[PageSnapshot],
    ) -> ValidationVerdict {
        let delta = SnapshotDelta::between(&outcome.before, &outcome.after);

        if step.kind == ActionKind::Wait && delta.is_empty() {
            return ValidationVerdict::new(
                Verdict::NoChange,
                format!("page held steady through a {}ms pause", outcome.elapsed.as_millis()),
            );
        }

        if let Some(seen) = self.find_regression(&outcome.before, &outcome.after, history) {
            debug!(
                digest = %outcome.after.digest,
                seen_at = %seen.captured_at,
                "page state matches an earlier snapshot"
            );
            return ValidationVerdict::new(
                Verdict::Regression,
                format!(
                    "page returned to a state last seen at {}",
                    seen.captured_at.to_rfc3339()
                ),
            );
        }

        if outcome.succeeded() && delta.is_empty() && step.kind.must_change_page() {
            return ValidationVerdict::new(
                Verdict::SilentFailure,
                format!(
                    "{} via {} reported success but the page did not change",
                    step.kind,
                    outcome.driver
                ),
            );
        }

        ValidationVerdict::new(
            Verdict::Confirmed,
            format!("page changed: {}", delta.describe()),
        )
    }

    fn find_regression<'a>(
        &self,
        before: &PageSnapshot,
        after: &PageSnapshot,
        history: &'a [PageSnapshot],
    ) -> Option<&'a PageSnapshot> {
        history
            .iter()
            .rev()
            .take(self.config.regression_window)
            .filter(|prior| prior.digest != before.digest)
            .find(|prior| prior.digest == after.digest)
    }
}

//! Reward scoring and the persist/skip decision for captures.
//!
//! Rewards grade the observed page change, not the action's ambition:
//! structural transitions (navigation, overlays) land in the top band,
//! content-level changes in the middle band, and everything else in the
//! idle band. An action earns a capture when its reward clears the
//! per-action threshold and the resulting state has not already been
//! persisted.

use crate::snapshot::SnapshotDelta;
use crate::types::{ActionKind, ActionOutcome, Step};
use crate::validator::Verdict;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Reward bands and per-action persistence thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreTable {
    /// Reward range for structural transitions (new URL, overlay traffic)
    pub structural_band: (f64, f64),

    /// Reward range for content-level changes within the same page
    pub interaction_band: (f64, f64),

    /// Reward range for actions that left the page essentially alone
    pub idle_band: (f64, f64),

    /// Interactive-element growth that counts as a revealed form
    pub form_reveal_threshold: i64,

    /// Persistence threshold for action kinds not listed in `thresholds`
    pub default_threshold: f64,

    /// Per-action persistence thresholds
    pub thresholds: BTreeMap<ActionKind, f64>,
}

impl Default for ScoreTable {
    fn default() -> Self {
        let mut thresholds = BTreeMap::new();
        // Typing and navigation are cheap to observe, so they persist on
        // modest change; a wait only earns a capture when something
        // structural happened during it.
        thresholds.insert(ActionKind::Type, 0.4);
        thresholds.insert(ActionKind::Navigate, 0.4);
        thresholds.insert(ActionKind::Wait, 0.7);
        Self {
            structural_band: (0.8, 1.0),
            interaction_band: (0.5, 0.7),
            idle_band: (0.1, 0.4),
            form_reveal_threshold: 3,
            default_threshold: 0.5,
            thresholds,
        }
    }
}

impl ScoreTable {
    pub fn threshold_for(&self, kind: ActionKind) -> f64 {
        self.thresholds
            .get(&kind)
            .copied()
            .unwrap_or(self.default_threshold)
    }
}

/// Outcome of scoring one executed step.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CaptureDecision {
    pub reward: f64,
    pub threshold: f64,
    pub persist: bool,
}

/// Scores executed steps and decides which resulting states to keep.
#[derive(Debug, Clone, Default)]
pub struct CaptureScorer {
    table: ScoreTable,
}

impl CaptureScorer {
    pub fn new(table: ScoreTable) -> Self {
        Self { table }
    }

    /// Score a step and decide whether its after-state should be persisted.
    ///
    /// `last_transition_digest` is the landing digest of the previous
    /// successful step; arriving there again is not a new discovery.
    /// `last_persisted_digest` suppresses captures of a state that is
    /// already stored.
    pub fn decide(
        &self,
        step: &Step,
        outcome: &ActionOutcome,
        verdict: Verdict,
        last_transition_digest: Option<&str>,
        last_persisted_digest: Option<&str>,
    ) -> CaptureDecision {
        let reward = self.reward_for(step, outcome, verdict, last_transition_digest);
        let threshold = self.table.threshold_for(step.kind);
        let already_stored = last_persisted_digest == Some(outcome.after.digest.as_str());
        let persist = outcome.succeeded() && reward >= threshold && !already_stored;
        debug!(
            kind = %step.kind,
            reward,
            threshold,
            persist,
            "scored step outcome"
        );
        CaptureDecision {
            reward,
            threshold,
            persist,
        }
    }

    fn reward_for(
        &self,
        step: &Step,
        outcome: &ActionOutcome,
        verdict: Verdict,
        last_transition_digest: Option<&str>,
    ) -> f64 {
        if matches!(verdict, Verdict::SilentFailure | Verdict::NoChange) {
            return midpoint(self.table.idle_band);
        }

        let delta = SnapshotDelta::between(&outcome.before, &outcome.after);
        if delta.is_empty() {
            return self.table.idle_band.0;
        }
        if last_transition_digest == Some(outcome.after.digest.as_str()) {
            return self.table.idle_band.0;
        }

        if delta.is_structural() {
            if !delta.overlays_appeared.is_empty() {
                return self.table.structural_band.1;
            }
            if delta.url_changed {
                return midpoint(self.table.structural_band);
            }
            return self.table.structural_band.0;
        }

        if matches!(step.kind, ActionKind::Wait | ActionKind::Scroll) {
            return self.table.idle_band.1;
        }

        if delta.interactive_delta >= self.table.form_reveal_threshold {
            return self.table.interaction_band.1;
        }
        midpoint(self.table.interaction_band)
    }
}

fn midpoint((lo, hi): (f64, f64)) -> f64 {
    (lo + hi) / 2.0
}

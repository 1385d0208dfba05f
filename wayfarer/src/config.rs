//! Engine configuration. Every tunable lives here as data with a `Default`
//! carrying the production constants, so threshold tuning is a config
//! change, not a code change.

use crate::scorer::ScoreTable;
use serde::{Deserialize, Serialize};

/// Tunables for the action executor cascade.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Per-strategy lookup timeout in layer 1 (milliseconds)
    pub strategy_timeout_ms: u64,

    /// Lookup timeout when piercing frames in layer 2; kept shorter than the
    /// top-document timeout so a deep frame tree cannot eat the step budget
    pub frame_timeout_ms: u64,

    /// Definite layer 1 failures required before layer 2 activates
    pub layer2_activation_failures: usize,

    /// Stale-element retries in layer 2
    pub stale_retries: u32,

    /// Backoff between stale-element retries (milliseconds)
    pub stale_backoff_ms: u64,

    /// Post-success quiescence deadline before the after snapshot
    /// (milliseconds)
    pub quiescence_timeout_ms: u64,

    /// Extra settle time after a navigation whose quiescence window expired
    /// (milliseconds)
    pub navigation_fallback_wait_ms: u64,

    /// Fixed pause performed by a `wait` step (milliseconds)
    pub wait_step_ms: u64,

    /// Vertical distance of a `scroll` step (pixels)
    pub scroll_amount_px: f64,

    /// Minimum confidence for visual text matches in layer 3
    pub visual_min_confidence: f32,

    /// Downward offset from a matched label to its input field (pixels);
    /// labels sit above the control they describe
    pub label_input_offset_px: f64,

    /// Accepted width range for button-like regions (pixels)
    pub button_width_range: (f64, f64),

    /// Accepted height range for button-like regions (pixels)
    pub button_height_range: (f64, f64),
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            strategy_timeout_ms: 10_000,
            frame_timeout_ms: 2_000,
            layer2_activation_failures: 2,
            stale_retries: 3,
            stale_backoff_ms: 500,
            quiescence_timeout_ms: 5_000,
            navigation_fallback_wait_ms: 1_000,
            wait_step_ms: 2_000,
            scroll_amount_px: 600.0,
            visual_min_confidence: 0.7,
            label_input_offset_px: 20.0,
            button_width_range: (20.0, 300.0),
            button_height_range: (15.0, 100.0),
        }
    }
}

/// Tunables for state validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// How many prior snapshots the regression check compares against
    pub regression_window: usize,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            regression_window: 5,
        }
    }
}

/// Tunables for the context store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Most-recent-N snapshots retained per task for regression comparison
    pub history_limit: usize,

    /// Version gap beyond which a reader's view counts as desynchronized
    pub desync_version_gap: u64,

    /// Reader staleness beyond which its view counts as desynchronized
    /// (seconds)
    pub desync_staleness_secs: i64,

    /// Remote mirror request timeout (milliseconds)
    pub mirror_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            history_limit: 20,
            desync_version_gap: 5,
            desync_staleness_secs: 60,
            mirror_timeout_ms: 5_000,
        }
    }
}

/// Tunables for the workflow orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Per-step retry ceiling before the task is declared stuck
    pub step_retry_limit: u32,

    /// Global cap on executed steps regardless of per-step retries
    pub step_budget: usize,

    /// Commit retries on version rejection before the task fails
    pub commit_retry_limit: u32,

    /// Planner call deadline (milliseconds)
    pub planner_timeout_ms: u64,

    /// Ask the planner for a revised plan after a regression verdict
    pub replan_on_regression: bool,

    /// Treat capture sink failures as fatal for the task
    pub require_capture_sink: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            step_retry_limit: 3,
            step_budget: 50,
            commit_retry_limit: 3,
            planner_timeout_ms: 30_000,
            replan_on_regression: true,
            require_capture_sink: false,
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub executor: ExecutorConfig,
    pub validator: ValidatorConfig,
    pub scorer: ScoreTable,
    pub store: StoreConfig,
    pub orchestrator: OrchestratorConfig,
}

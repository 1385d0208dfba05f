//! Capture records and the sink they are handed to.
//!
//! A capture is the pairing of a post-action screenshot with the metadata
//! that made it worth keeping. The engine decides *whether* to capture
//! (see [`crate::scorer`]); the sink decides *where* the bytes go.

use crate::drivers::ScreenshotResult;
use crate::errors::EngineError;
use crate::snapshot::OverlayKind;
use crate::types::ActionKind;
use crate::validator::Verdict;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata attached to a persisted UI state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureRecord {
    pub task_id: String,
    pub app_identifier: String,
    pub step_index: usize,
    pub action_kind: ActionKind,
    pub reward: f64,
    pub verdict: Verdict,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detected_overlay_kind: Option<OverlayKind>,
    /// Content digest of the captured state, used for duplicate suppression
    pub digest: String,
    /// Where the sink stored the image, if it stores anywhere
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stored_path: Option<String>,
}

/// Destination for captured UI states.
///
/// Implementations persist the screenshot bytes and return the location they
/// chose, or `None` when the sink has no addressable storage.
#[async_trait]
pub trait CaptureSink: Send + Sync {
    async fn persist(
        &self,
        record: &CaptureRecord,
        image: &ScreenshotResult,
    ) -> Result<Option<String>, EngineError>;
}

/// Sink that drops every capture. Used when no storage is configured;
/// records still flow into the task context.
#[derive(Debug, Default)]
pub struct DiscardSink;

#[async_trait]
impl CaptureSink for DiscardSink {
    async fn persist(
        &self,
        _record: &CaptureRecord,
        _image: &ScreenshotResult,
    ) -> Result<Option<String>, EngineError> {
        Ok(None)
    }
}

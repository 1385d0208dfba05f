//! Page fingerprints and the semantic diff between them.
//!
//! A snapshot is what the validator and scorer reason about: not pixels, not
//! a DOM tree, but a digest of the normalized visible text plus the handful
//! of structural signals (overlays, URL, counters) that distinguish one UI
//! state from another.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Overlay surfaces the content extraction can flag on a page. These are the
/// states that matter most for documentation precisely because they share a
/// URL with their parent page.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum OverlayKind {
    Modal,
    Dropdown,
    Popup,
}

/// Normalized extraction of the live page, produced by an automation driver
/// and consumed here to build a snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageContent {
    /// Visible text of the document, roughly in reading order
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub overlays: BTreeSet<OverlayKind>,
    /// Count of interactive elements (buttons, links, inputs) the driver saw
    #[serde(default)]
    pub interactive_count: usize,
}

/// Collapse whitespace runs to single spaces and trim the ends, so that
/// layout-only churn does not change the digest.
pub(crate) fn normalize_text(text: &str) -> String {
    let mut normalized = String::with_capacity(text.len());
    let mut pending_space = false;
    for ch in text.chars() {
        if ch.is_whitespace() {
            pending_space = !normalized.is_empty();
        } else {
            if pending_space {
                normalized.push(' ');
                pending_space = false;
            }
            normalized.push(ch);
        }
    }
    normalized
}

/// Content digest of a page text extraction.
pub fn content_digest(text: &str) -> String {
    blake3::hash(normalize_text(text).as_bytes())
        .to_hex()
        .to_string()
}

/// A structural fingerprint of the application at one instant. Immutable,
/// produced on demand, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageSnapshot {
    pub digest: String,
    #[serde(default)]
    pub overlays: BTreeSet<OverlayKind>,
    /// Nullable: overlay states often share their parent page's URL, and
    /// some drivers cannot report one at all
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub captured_at: DateTime<Utc>,
    /// Length of the normalized visible text, a cheap user-visible counter
    pub visible_text_len: usize,
    pub interactive_count: usize,
}

impl PageSnapshot {
    pub fn from_content(content: &PageContent) -> Self {
        let normalized = normalize_text(&content.text);
        Self {
            digest: blake3::hash(normalized.as_bytes()).to_hex().to_string(),
            overlays: content.overlays.clone(),
            url: content.url.clone(),
            captured_at: Utc::now(),
            visible_text_len: normalized.chars().count(),
            interactive_count: content.interactive_count,
        }
    }

    /// The most prominent overlay on this snapshot, if any. Modals win over
    /// dropdowns which win over popups.
    pub fn primary_overlay(&self) -> Option<OverlayKind> {
        self.overlays.iter().next().copied()
    }
}

/// Field-by-field comparison between two snapshots: the semantic diff the
/// validator and scorer share.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotDelta {
    pub digest_changed: bool,
    pub url_changed: bool,
    pub overlays_appeared: BTreeSet<OverlayKind>,
    pub overlays_dismissed: BTreeSet<OverlayKind>,
    pub text_len_delta: i64,
    pub interactive_delta: i64,
}

impl SnapshotDelta {
    pub fn between(before: &PageSnapshot, after: &PageSnapshot) -> Self {
        Self {
            digest_changed: before.digest != after.digest,
            url_changed: before.url != after.url,
            overlays_appeared: after.overlays.difference(&before.overlays).copied().collect(),
            overlays_dismissed: before.overlays.difference(&after.overlays).copied().collect(),
            text_len_delta: after.visible_text_len as i64 - before.visible_text_len as i64,
            interactive_delta: after.interactive_count as i64 - before.interactive_count as i64,
        }
    }

    /// True when nothing a user could notice moved.
    pub fn is_empty(&self) -> bool {
        !self.digest_changed
            && !self.url_changed
            && self.overlays_appeared.is_empty()
            && self.overlays_dismissed.is_empty()
            && self.interactive_delta == 0
    }

    /// A change big enough to count as a state-structure transition:
    /// navigation, or an overlay opening or closing.
    pub fn is_structural(&self) -> bool {
        self.url_changed
            || !self.overlays_appeared.is_empty()
            || !self.overlays_dismissed.is_empty()
    }

    /// Short human-readable summary for verdict rationales.
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if self.url_changed {
            parts.push("url changed".to_string());
        }
        if !self.overlays_appeared.is_empty() {
            parts.push(format!("{} overlay(s) appeared", self.overlays_appeared.len()));
        }
        if !self.overlays_dismissed.is_empty() {
            parts.push(format!(
                "{} overlay(s) dismissed",
                self.overlays_dismissed.len()
            ));
        }
        if self.digest_changed {
            parts.push(format!("content changed ({:+} chars)", self.text_len_delta));
        }
        if self.interactive_delta != 0 {
            parts.push(format!("{:+} interactive elements", self.interactive_delta));
        }
        if parts.is_empty() {
            "no observable change".to_string()
        } else {
            parts.join(", ")
        }
    }
}

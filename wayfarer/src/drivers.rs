//! Boundary traits for the supplied automation and visual capabilities.
//!
//! The engine does not implement browser automation or image analysis. It is
//! constructed with trait objects for a primary automation driver (layer 1),
//! a recovery driver able to pierce frames and shadow roots (layer 2), and a
//! visual driver for image-based localization (layer 3). Implementations map
//! their native failures into [`EngineError`] at this boundary.

use crate::errors::EngineError;
use crate::snapshot::PageContent;
use crate::target::TargetDescriptor;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Where a lookup is allowed to search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchScope {
    /// The top document only
    MainDocument,
    /// Pierce nested frames and shadow-root boundaries. Drivers that cannot
    /// see into frames reject this scope with `UnsupportedOperation`.
    PierceFrames,
}

/// Opaque handle to an element a driver resolved. Handles can go stale when
/// the page re-renders; drivers report that as `EngineError::StaleElement`
/// so the recovery layer can re-resolve and retry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementRef {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// (x, y, width, height) in page coordinates, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounds: Option<(f64, f64, f64, f64)>,
}

impl ElementRef {
    /// Center of the element's bounds, if the driver reported them.
    pub fn center(&self) -> Option<(f64, f64)> {
        self.bounds
            .map(|(x, y, w, h)| (x + w / 2.0, y + h / 2.0))
    }
}

/// Holds the screenshot data handed to the visual capability.
#[derive(Debug, Clone)]
pub struct ScreenshotResult {
    /// Raw image data (RGBA)
    pub image_data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Rectangle where the visual capability localized text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextRegion {
    pub text: String,
    /// Recognition confidence in [0, 1]
    pub confidence: f32,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl TextRegion {
    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// Rectangle with a button-like shape found by edge analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ButtonRegion {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl ButtonRegion {
    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// The low-level automation capability: element lookup, pointer and keyboard
/// dispatch, and page observation. Supplied by the embedder; one instance
/// serves as the layer 1 driver and another (or the same) as the layer 2
/// recovery driver.
#[async_trait]
pub trait AutomationDriver: Send + Sync {
    /// Load a URL and return once basic document readiness is reached.
    async fn navigate(&self, url: &str) -> Result<(), EngineError>;

    /// Resolve a target to an element handle within the given scope.
    async fn find(
        &self,
        target: &TargetDescriptor,
        scope: SearchScope,
        timeout: Duration,
    ) -> Result<ElementRef, EngineError>;

    /// Broad scan: the first visible element that loosely matches the
    /// target. Riskier than `find`; the cascade uses it last.
    async fn find_any_visible(
        &self,
        target: &TargetDescriptor,
        timeout: Duration,
    ) -> Result<ElementRef, EngineError>;

    /// Nearest interactive ancestor of an element, for targets that resolve
    /// to a text node inside the thing that actually takes the click.
    async fn ancestor_interactive(
        &self,
        element: &ElementRef,
    ) -> Result<ElementRef, EngineError>;

    /// Native pointer click on a resolved element.
    async fn click(&self, element: &ElementRef) -> Result<(), EngineError>;

    /// Invoke the element's activation handler at script level, bypassing
    /// pointer dispatch. Works when an overlay blocks the native path.
    async fn script_click(&self, element: &ElementRef) -> Result<(), EngineError>;

    /// Pointer click at an absolute page coordinate.
    async fn click_at(&self, x: f64, y: f64) -> Result<(), EngineError>;

    /// Type text into a resolved element.
    async fn type_text(&self, element: &ElementRef, text: &str) -> Result<(), EngineError>;

    /// Keyboard events at the current focus, for coordinate-driven typing.
    async fn type_at_focus(&self, text: &str) -> Result<(), EngineError>;

    /// Scroll the page by the given deltas.
    async fn scroll(&self, dx: f64, dy: f64) -> Result<(), EngineError>;

    /// Normalized extraction of the current page.
    async fn page_content(&self) -> Result<PageContent, EngineError>;

    /// Full-page image for the visual layer and for capture payloads.
    async fn screenshot(&self) -> Result<ScreenshotResult, EngineError>;

    /// Wait until the document is ready and no network activity is pending,
    /// or until the deadline passes. Returns `Ok(true)` when quiescent,
    /// `Ok(false)` when the deadline expired first.
    async fn await_quiescence(&self, timeout: Duration) -> Result<bool, EngineError>;
}

/// The visual capability: pure image analysis, no side effects. All pointer
/// and keyboard events stay with the automation driver.
#[async_trait]
pub trait VisualDriver: Send + Sync {
    /// OCR-style localization of the given text in the image.
    async fn locate_text(
        &self,
        image: &ScreenshotResult,
        text: &str,
    ) -> Result<Vec<TextRegion>, EngineError>;

    /// Edge-detected button-like regions in the image.
    async fn locate_buttons(
        &self,
        image: &ScreenshotResult,
    ) -> Result<Vec<ButtonRegion>, EngineError>;
}

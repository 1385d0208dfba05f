//! Layer 3: visual fallback.
//!
//! Last resort when neither document tree can produce the element. Works
//! from a screenshot alone: text targets are localized by recognition,
//! targetless clicks fall back to button-shaped regions from edge analysis,
//! and typing aims just below its matched label, where the field sits.
//! Pointer and keyboard events still go through the automation driver; the
//! visual capability never touches the page.

use crate::config::ExecutorConfig;
use crate::drivers::{AutomationDriver, ButtonRegion, TextRegion, VisualDriver};
use crate::errors::EngineError;
use crate::types::{ActionKind, Step};
use tracing::debug;

pub(super) async fn run(
    driver: &dyn AutomationDriver,
    visual: &dyn VisualDriver,
    step: &Step,
    config: &ExecutorConfig,
) -> Result<&'static str, EngineError> {
    if !matches!(step.kind, ActionKind::Click | ActionKind::Type) {
        return Err(EngineError::UnsupportedOperation(format!(
            "visual fallback does not apply to {} steps",
            step.kind
        )));
    }

    let shot = driver.screenshot().await?;

    match step.target.visual_needle() {
        Some(needle) => {
            let regions = visual.locate_text(&shot, needle).await?;
            let region = best_text_match(regions, config.visual_min_confidence).ok_or_else(
                || EngineError::ElementNotFound(format!("text '{needle}' not visible on screen")),
            )?;
            let (cx, cy) = region.center();
            debug!(needle, x = cx, y = cy, confidence = region.confidence, "visual text match");
            match step.kind {
                ActionKind::Type => {
                    let value = step.value.as_deref().ok_or_else(|| {
                        EngineError::InvalidTarget("type step is missing its input value".into())
                    })?;
                    // The matched region is the label; the field sits below it.
                    driver
                        .click_at(cx, cy + config.label_input_offset_px)
                        .await?;
                    driver.type_at_focus(value).await?;
                    Ok("visual_label_offset")
                }
                _ => {
                    driver.click_at(cx, cy).await?;
                    Ok("visual_text")
                }
            }
        }
        None => {
            if step.kind == ActionKind::Type {
                return Err(EngineError::InvalidTarget(format!(
                    "no visible text to anchor typing for '{}'",
                    step.target
                )));
            }
            let buttons = visual.locate_buttons(&shot).await?;
            let region = best_button(buttons, config).ok_or_else(|| {
                EngineError::ElementNotFound("no button-shaped regions on screen".into())
            })?;
            let (cx, cy) = region.center();
            debug!(x = cx, y = cy, "visual button match");
            driver.click_at(cx, cy).await?;
            Ok("visual_button")
        }
    }
}

/// Highest-confidence region above the floor; ties go to the topmost, then
/// leftmost, so repeated runs pick the same region.
fn best_text_match(regions: Vec<TextRegion>, min_confidence: f32) -> Option<TextRegion> {
    regions
        .into_iter()
        .filter(|r| r.confidence >= min_confidence)
        .min_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then(a.y.total_cmp(&b.y))
                .then(a.x.total_cmp(&b.x))
        })
}

/// Topmost-leftmost region whose shape fits the configured button envelope.
fn best_button(buttons: Vec<ButtonRegion>, config: &ExecutorConfig) -> Option<ButtonRegion> {
    let (w_lo, w_hi) = config.button_width_range;
    let (h_lo, h_hi) = config.button_height_range;
    buttons
        .into_iter()
        .filter(|b| b.width > w_lo && b.width < w_hi && b.height > h_lo && b.height < h_hi)
        .min_by(|a, b| a.y.total_cmp(&b.y).then(a.x.total_cmp(&b.x)))
}

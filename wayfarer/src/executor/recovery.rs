//! Layer 2: structural recovery.
//!
//! Runs only after layer 1 reported enough definite misses to suggest the
//! element lives somewhere the top document cannot see. The recovery driver
//! searches across frame and shadow-root boundaries, retries stale handles
//! with a backoff, and falls back to a script-injected click when an overlay
//! swallows the pointer.

use crate::config::ExecutorConfig;
use crate::drivers::AutomationDriver;
use crate::errors::EngineError;
use crate::types::{ActionKind, Step};
use std::time::Duration;
use tracing::debug;

/// Attempt the step through the recovery driver. Returns the label of the
/// path that landed.
pub(super) async fn run(
    driver: &dyn AutomationDriver,
    step: &Step,
    config: &ExecutorConfig,
) -> Result<&'static str, EngineError> {
    if !matches!(step.kind, ActionKind::Click | ActionKind::Type) {
        return Err(EngineError::UnsupportedOperation(format!(
            "structural recovery does not apply to {} steps",
            step.kind
        )));
    }

    let frame_timeout = Duration::from_millis(config.frame_timeout_ms);
    let backoff = Duration::from_millis(config.stale_backoff_ms);

    for attempt in 0..=config.stale_retries {
        if attempt > 0 {
            debug!(attempt, "retrying after stale element handle");
            tokio::time::sleep(backoff).await;
        }

        let element = driver
            .find(&step.target, crate::drivers::SearchScope::PierceFrames, frame_timeout)
            .await?;

        let acted = match step.kind {
            ActionKind::Type => {
                let value = step.value.as_deref().ok_or_else(|| {
                    EngineError::InvalidTarget("type step is missing its input value".into())
                })?;
                driver.type_text(&element, value).await
            }
            _ => driver.click(&element).await,
        };

        match acted {
            Ok(()) => return Ok("frame_pierce"),
            // The handle died between find and act; re-resolve and retry.
            Err(EngineError::StaleElement(_)) => continue,
            Err(EngineError::ElementObscured(_)) if step.kind == ActionKind::Click => {
                debug!("pointer path blocked, injecting click at script level");
                driver.script_click(&element).await?;
                return Ok("script_injected");
            }
            Err(e) => return Err(e),
        }
    }

    Err(EngineError::StaleElement(format!(
        "element stayed stale through {} retries",
        config.stale_retries
    )))
}

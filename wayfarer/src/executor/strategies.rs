//! Layer 1 strategy table and dispatch.
//!
//! Strategies are ordered from most precise to most permissive. Each one
//! resolves the step's target a different way and hands the resolved element
//! to the driver; the cascade in [`super::ActionExecutor`] walks the table
//! until one lands.

use crate::config::ExecutorConfig;
use crate::drivers::{AutomationDriver, SearchScope};
use crate::errors::EngineError;
use crate::target::TargetDescriptor;
use crate::types::{ActionKind, Step};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The six ways layer 1 can resolve and act on a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Resolve the target exactly and invoke its activation at script level
    ScriptInvoke,
    /// Accessibility-role query derived from the target
    RoleLookup,
    /// Pointer event at the target's coordinates
    CoordinatePointer,
    /// Visible-text match
    TextLookup,
    /// Resolve the target, then climb to the nearest interactive ancestor
    AncestorInteractive,
    /// First visible element that loosely matches, anywhere on the page
    AnyVisibleMatch,
}

impl StrategyKind {
    pub fn label(&self) -> &'static str {
        match self {
            StrategyKind::ScriptInvoke => "script_invoke",
            StrategyKind::RoleLookup => "role_lookup",
            StrategyKind::CoordinatePointer => "coordinate_pointer",
            StrategyKind::TextLookup => "text_lookup",
            StrategyKind::AncestorInteractive => "ancestor_interactive",
            StrategyKind::AnyVisibleMatch => "any_visible_match",
        }
    }
}

/// How likely a strategy is to act on the wrong element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    Precise,
    Moderate,
    Broad,
}

/// One entry in the layer 1 cascade.
#[derive(Debug, Clone, Copy)]
pub struct StrategyDescriptor {
    pub kind: StrategyKind,
    pub risk: RiskTier,
    pub timeout: Duration,
}

/// The ordered strategy table for one action kind.
///
/// Clicks get the full table. Typing skips script invocation because focus
/// must really land in the field. Scrolls and navigations have exactly one
/// way to happen and recover at higher layers only through retries there.
pub fn layer1_strategies(kind: ActionKind, config: &ExecutorConfig) -> Vec<StrategyDescriptor> {
    let timeout = Duration::from_millis(config.strategy_timeout_ms);
    let entry = |kind, risk| StrategyDescriptor {
        kind,
        risk,
        timeout,
    };
    match kind {
        ActionKind::Click => vec![
            entry(StrategyKind::ScriptInvoke, RiskTier::Precise),
            entry(StrategyKind::RoleLookup, RiskTier::Precise),
            entry(StrategyKind::CoordinatePointer, RiskTier::Moderate),
            entry(StrategyKind::TextLookup, RiskTier::Moderate),
            entry(StrategyKind::AncestorInteractive, RiskTier::Broad),
            entry(StrategyKind::AnyVisibleMatch, RiskTier::Broad),
        ],
        ActionKind::Type => vec![
            entry(StrategyKind::RoleLookup, RiskTier::Precise),
            entry(StrategyKind::TextLookup, RiskTier::Moderate),
            entry(StrategyKind::CoordinatePointer, RiskTier::Moderate),
            entry(StrategyKind::AncestorInteractive, RiskTier::Broad),
            entry(StrategyKind::AnyVisibleMatch, RiskTier::Broad),
        ],
        ActionKind::Scroll | ActionKind::Navigate => {
            vec![entry(StrategyKind::ScriptInvoke, RiskTier::Precise)]
        }
        ActionKind::Wait => Vec::new(),
    }
}

/// Execute one strategy against the top document.
pub(super) async fn run_strategy(
    driver: &dyn AutomationDriver,
    step: &Step,
    strategy: StrategyKind,
    timeout: Duration,
    config: &ExecutorConfig,
) -> Result<(), EngineError> {
    if let TargetDescriptor::Invalid(reason) = &step.target {
        return Err(EngineError::InvalidTarget(reason.clone()));
    }

    match strategy {
        StrategyKind::ScriptInvoke => match step.kind {
            ActionKind::Navigate => {
                let TargetDescriptor::Url(url) = &step.target else {
                    return Err(EngineError::InvalidTarget(format!(
                        "navigation needs a url target, got '{}'",
                        step.target
                    )));
                };
                driver.navigate(url).await
            }
            ActionKind::Scroll => driver.scroll(0.0, config.scroll_amount_px).await,
            _ => {
                let element = driver
                    .find(&step.target, SearchScope::MainDocument, timeout)
                    .await?;
                driver.script_click(&element).await
            }
        },
        StrategyKind::RoleLookup => {
            let target = role_target(step)?;
            let element = driver
                .find(&target, SearchScope::MainDocument, timeout)
                .await?;
            act(driver, step, &element).await
        }
        StrategyKind::CoordinatePointer => {
            let (x, y) = match &step.target {
                TargetDescriptor::Point { x, y } => (*x, *y),
                other => {
                    let element = driver
                        .find(other, SearchScope::MainDocument, timeout)
                        .await?;
                    element.center().ok_or_else(|| {
                        EngineError::InvalidTarget(format!(
                            "element for '{other}' reported no bounds"
                        ))
                    })?
                }
            };
            driver.click_at(x, y).await?;
            if step.kind == ActionKind::Type {
                driver.type_at_focus(step_value(step)?).await?;
            }
            Ok(())
        }
        StrategyKind::TextLookup => {
            let target = text_target(step)?;
            let element = driver
                .find(&target, SearchScope::MainDocument, timeout)
                .await?;
            act(driver, step, &element).await
        }
        StrategyKind::AncestorInteractive => {
            let element = driver
                .find(&step.target, SearchScope::MainDocument, timeout)
                .await?;
            let ancestor = driver.ancestor_interactive(&element).await?;
            act(driver, step, &ancestor).await
        }
        StrategyKind::AnyVisibleMatch => {
            let element = driver.find_any_visible(&step.target, timeout).await?;
            act(driver, step, &element).await
        }
    }
}

async fn act(
    driver: &dyn AutomationDriver,
    step: &Step,
    element: &crate::drivers::ElementRef,
) -> Result<(), EngineError> {
    match step.kind {
        ActionKind::Type => driver.type_text(element, step_value(step)?).await,
        _ => driver.click(element).await,
    }
}

fn step_value(step: &Step) -> Result<&str, EngineError> {
    step.value
        .as_deref()
        .ok_or_else(|| EngineError::InvalidTarget("type step is missing its input value".into()))
}

fn role_target(step: &Step) -> Result<TargetDescriptor, EngineError> {
    if let TargetDescriptor::Role { .. } = &step.target {
        return Ok(step.target.clone());
    }
    let name = step.target.visual_needle().map(str::to_string);
    if name.is_none() {
        return Err(EngineError::InvalidTarget(format!(
            "cannot derive a role query from '{}'",
            step.target
        )));
    }
    let role = match step.kind {
        ActionKind::Type => "textbox",
        _ => "button",
    };
    Ok(TargetDescriptor::Role {
        role: role.to_string(),
        name,
    })
}

fn text_target(step: &Step) -> Result<TargetDescriptor, EngineError> {
    match &step.target {
        TargetDescriptor::Text(_) => Ok(step.target.clone()),
        other => other
            .visual_needle()
            .map(|needle| TargetDescriptor::Text(needle.to_string()))
            .ok_or_else(|| {
                EngineError::InvalidTarget(format!("no text to match for '{other}'"))
            }),
    }
}

//! Tests for the three-layer action cascade

use crate::config::ExecutorConfig;
use crate::drivers::{ButtonRegion, TextRegion};
use crate::errors::EngineError;
use crate::executor::ActionExecutor;
use crate::target::TargetDescriptor;
use crate::tests::mocks::{content, content_at, element, DriverScript, ScriptedDriver, ScriptedVisual};
use crate::types::{ActionKind, DriverLayer, Step};
use std::collections::VecDeque;
use std::sync::Arc;

fn build(
    primary: DriverScript,
    recovery: DriverScript,
    visual: ScriptedVisual,
) -> (ActionExecutor, Arc<ScriptedDriver>, Arc<ScriptedDriver>) {
    let primary = Arc::new(ScriptedDriver::new(primary));
    let recovery = Arc::new(ScriptedDriver::new(recovery));
    let executor = ActionExecutor::new(
        primary.clone(),
        recovery.clone(),
        Arc::new(visual),
        ExecutorConfig::default(),
    );
    (executor, primary, recovery)
}

fn two_pages(first: &str, second: &str) -> VecDeque<crate::snapshot::PageContent> {
    VecDeque::from([content(first), content(second)])
}

#[tokio::test]
async fn test_first_strategy_success_stops_the_cascade() {
    let script = DriverScript {
        find_results: VecDeque::from([Ok(element("submit-btn"))]),
        contents: two_pages("Form", "Form Thank you"),
        ..Default::default()
    };
    let (executor, primary, recovery) = build(script, DriverScript::default(), ScriptedVisual::default());

    let outcome = executor.run(&Step::click("Submit", 0)).await.unwrap();

    assert!(outcome.succeeded());
    assert_eq!(outcome.driver, DriverLayer::Layer1);
    assert_eq!(outcome.strategy.as_deref(), Some("script_invoke"));
    assert!(outcome.failures.is_empty());
    assert_ne!(outcome.before.digest, outcome.after.digest);
    assert!(outcome.after_image.is_some());

    let calls = primary.calls();
    assert_eq!(calls[0], "find(text:Submit)@main");
    assert_eq!(calls[1], "script_click(submit-btn)");
    assert!(recovery.calls().is_empty());
}

#[tokio::test]
async fn test_cascade_falls_through_to_role_lookup() {
    let script = DriverScript {
        find_results: VecDeque::from([
            Err(EngineError::ElementNotFound("no script handle".into())),
            Ok(element("submit-btn")),
        ]),
        contents: two_pages("Form", "Form saved"),
        ..Default::default()
    };
    let (executor, primary, _) = build(script, DriverScript::default(), ScriptedVisual::default());

    let outcome = executor.run(&Step::click("Submit", 0)).await.unwrap();

    assert_eq!(outcome.strategy.as_deref(), Some("role_lookup"));
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].strategy, "script_invoke");
    assert!(outcome.failures[0].definite);

    let calls = primary.calls();
    assert_eq!(calls[1], "find(role:button|name:Submit)@main");
    assert_eq!(calls[2], "click(submit-btn)");
}

#[tokio::test]
async fn test_layer2_activates_after_definite_failures() {
    // Every layer 1 lookup misses outright, which clears the activation bar.
    let primary = DriverScript {
        contents: two_pages("Form", "Form updated"),
        ..Default::default()
    };
    let recovery = DriverScript {
        find_results: VecDeque::from([Ok(element("framed-btn"))]),
        ..Default::default()
    };
    let (executor, _, recovery_handle) = build(primary, recovery, ScriptedVisual::default());

    let outcome = executor.run(&Step::click("Submit", 0)).await.unwrap();

    assert_eq!(outcome.driver, DriverLayer::Layer2);
    assert_eq!(outcome.strategy.as_deref(), Some("frame_pierce"));
    assert_eq!(outcome.failures.len(), 6);
    assert!(outcome.failures.iter().all(|f| f.layer == DriverLayer::Layer1));
    assert!(outcome.failures.iter().all(|f| f.definite));

    let calls = recovery_handle.calls();
    assert_eq!(calls[0], "find(text:Submit)@pierce");
    assert_eq!(calls[1], "click(framed-btn)");
}

#[tokio::test(start_paused = true)]
async fn test_timeouts_alone_never_activate_layer2() {
    // Lookups hang instead of missing: every failure is a timeout, and
    // timeouts are not definite enough to justify the recovery layer.
    let primary = DriverScript {
        hang_finds: true,
        ..Default::default()
    };
    let (executor, _, recovery_handle) =
        build(primary, DriverScript::default(), ScriptedVisual::default());

    let outcome = executor.run(&Step::click("Submit", 0)).await.unwrap();

    assert!(!outcome.succeeded());
    assert_eq!(outcome.driver, DriverLayer::None);
    assert_eq!(outcome.failures.len(), 6);
    assert!(outcome.failures.iter().all(|f| !f.definite));
    assert!(outcome.failures.iter().all(|f| f.layer == DriverLayer::Layer1));
    assert!(recovery_handle.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_stale_handles_are_retried_with_backoff() {
    let recovery = DriverScript {
        find_results: VecDeque::from([
            Ok(element("btn")),
            Ok(element("btn")),
            Ok(element("btn")),
            Ok(element("btn")),
        ]),
        click_results: VecDeque::from([
            Err(EngineError::StaleElement("handle expired".into())),
            Err(EngineError::StaleElement("handle expired".into())),
            Err(EngineError::StaleElement("handle expired".into())),
            Ok(()),
        ]),
        ..Default::default()
    };
    let primary = DriverScript {
        contents: two_pages("Form", "Form done"),
        ..Default::default()
    };
    let (executor, _, recovery_handle) = build(primary, recovery, ScriptedVisual::default());

    let outcome = executor.run(&Step::click("Submit", 0)).await.unwrap();

    assert_eq!(outcome.driver, DriverLayer::Layer2);
    assert_eq!(outcome.strategy.as_deref(), Some("frame_pierce"));
    let finds = recovery_handle
        .calls()
        .iter()
        .filter(|c| c.starts_with("find("))
        .count();
    assert_eq!(finds, 4);
}

#[tokio::test]
async fn test_obscured_click_falls_back_to_script_injection() {
    let recovery = DriverScript {
        find_results: VecDeque::from([Ok(element("covered-btn"))]),
        click_results: VecDeque::from([Err(EngineError::ElementObscured(
            "cookie banner intercepts".into(),
        ))]),
        ..Default::default()
    };
    let primary = DriverScript {
        contents: two_pages("Consent wall", "Article"),
        ..Default::default()
    };
    let (executor, _, recovery_handle) = build(primary, recovery, ScriptedVisual::default());

    let outcome = executor.run(&Step::click("Accept", 0)).await.unwrap();

    assert_eq!(outcome.driver, DriverLayer::Layer2);
    assert_eq!(outcome.strategy.as_deref(), Some("script_injected"));
    assert!(recovery_handle
        .calls()
        .contains(&"script_click(covered-btn)".to_string()));
}

#[tokio::test]
async fn test_visual_text_fallback_clicks_the_best_region() {
    let visual = ScriptedVisual {
        text_regions: vec![
            TextRegion {
                text: "Continue".to_string(),
                confidence: 0.5,
                x: 10.0,
                y: 10.0,
                width: 80.0,
                height: 20.0,
            },
            TextRegion {
                text: "Continue".to_string(),
                confidence: 0.9,
                x: 100.0,
                y: 200.0,
                width: 80.0,
                height: 20.0,
            },
        ],
        ..Default::default()
    };
    let primary = DriverScript {
        contents: two_pages("Wizard step 1", "Wizard step 2"),
        ..Default::default()
    };
    let (executor, primary_handle, _) = build(primary, DriverScript::default(), visual);

    let outcome = executor.run(&Step::click("Continue", 0)).await.unwrap();

    assert_eq!(outcome.driver, DriverLayer::Layer3);
    assert_eq!(outcome.strategy.as_deref(), Some("visual_text"));
    // The low-confidence region sits above the floor's reach.
    assert!(primary_handle
        .calls()
        .contains(&"click_at(140,210)".to_string()));
}

#[tokio::test]
async fn test_visual_button_fallback_for_targetless_click() {
    let step = Step::click(TargetDescriptor::Point { x: 30.0, y: 40.0 }, 0);
    let primary = DriverScript {
        // The coordinate strategy's pointer dispatch is refused, so every
        // layer 1 road is closed.
        click_at_results: VecDeque::from([Err(EngineError::DriverError(
            "pointer dispatch refused".into(),
        ))]),
        contents: two_pages("Toolbar", "Toolbar pressed"),
        ..Default::default()
    };
    let visual = ScriptedVisual {
        button_regions: vec![
            // Too large and too small to be buttons
            ButtonRegion {
                x: 0.0,
                y: 0.0,
                width: 500.0,
                height: 400.0,
            },
            ButtonRegion {
                x: 5.0,
                y: 5.0,
                width: 10.0,
                height: 10.0,
            },
            ButtonRegion {
                x: 40.0,
                y: 60.0,
                width: 100.0,
                height: 30.0,
            },
        ],
        ..Default::default()
    };
    let (executor, primary_handle, _) = build(primary, DriverScript::default(), visual);

    let outcome = executor.run(&step).await.unwrap();

    assert_eq!(outcome.driver, DriverLayer::Layer3);
    assert_eq!(outcome.strategy.as_deref(), Some("visual_button"));
    assert!(primary_handle
        .calls()
        .contains(&"click_at(90,75)".to_string()));
}

#[tokio::test]
async fn test_visual_typing_aims_below_the_label() {
    let step = Step::type_text(TargetDescriptor::Label("Email".to_string()), "ada@example.test", 0);
    let visual = ScriptedVisual {
        text_regions: vec![TextRegion {
            text: "Email".to_string(),
            confidence: 0.95,
            x: 100.0,
            y: 100.0,
            width: 50.0,
            height: 20.0,
        }],
        ..Default::default()
    };
    let primary = DriverScript {
        contents: two_pages("Signup form", "Signup form filled"),
        ..Default::default()
    };
    let (executor, primary_handle, _) = build(primary, DriverScript::default(), visual);

    let outcome = executor.run(&step).await.unwrap();

    assert_eq!(outcome.driver, DriverLayer::Layer3);
    assert_eq!(outcome.strategy.as_deref(), Some("visual_label_offset"));
    let calls = primary_handle.calls();
    // Label center is (125, 110); the field sits 20px lower.
    assert!(calls.contains(&"click_at(125,130)".to_string()));
    assert!(calls.contains(&"type_focus(ada@example.test)".to_string()));
}

#[tokio::test]
async fn test_exhausted_cascade_reports_instead_of_erroring() {
    let (executor, _, _) = build(
        DriverScript::default(),
        DriverScript::default(),
        ScriptedVisual::default(),
    );

    let outcome = executor.run(&Step::click("Ghost", 0)).await.unwrap();

    assert!(!outcome.succeeded());
    assert_eq!(outcome.driver, DriverLayer::None);
    assert!(outcome.strategy.is_none());
    assert!(outcome.after_image.is_none());

    let by_layer = |layer| {
        outcome
            .failures
            .iter()
            .filter(|f| f.layer == layer)
            .count()
    };
    assert_eq!(by_layer(DriverLayer::Layer1), 6);
    assert_eq!(by_layer(DriverLayer::Layer2), 1);
    assert_eq!(by_layer(DriverLayer::Layer3), 1);
}

#[tokio::test]
async fn test_type_without_value_is_a_definite_miss() {
    let step = Step {
        kind: ActionKind::Type,
        target: TargetDescriptor::Text("Name".to_string()),
        value: None,
        index: 0,
    };
    let primary = DriverScript {
        find_results: VecDeque::from([Ok(element("name-field"))]),
        ..Default::default()
    };
    let (executor, _, _) = build(primary, DriverScript::default(), ScriptedVisual::default());

    let outcome = executor.run(&step).await.unwrap();

    assert!(!outcome.succeeded());
    assert!(outcome.failures[0].definite);
    assert!(outcome.failures[0].error.contains("missing its input value"));
}

#[tokio::test(start_paused = true)]
async fn test_wait_step_pauses_then_observes() {
    let primary = DriverScript {
        contents: two_pages("Loading", "Loaded results"),
        ..Default::default()
    };
    let (executor, primary_handle, _) =
        build(primary, DriverScript::default(), ScriptedVisual::default());

    let outcome = executor.run(&Step::wait(0)).await.unwrap();

    assert_eq!(outcome.driver, DriverLayer::Layer1);
    assert_eq!(outcome.strategy.as_deref(), Some("wait"));
    assert!(outcome.failures.is_empty());
    assert_ne!(outcome.before.digest, outcome.after.digest);
    // A pause issues no element lookups and no pointer traffic.
    assert!(primary_handle.calls().is_empty());
}

#[tokio::test]
async fn test_navigate_step_drives_the_browser() {
    let primary = DriverScript {
        contents: VecDeque::from([
            content_at("Home", "https://app.test/home"),
            content_at("Settings", "https://app.test/settings"),
        ]),
        ..Default::default()
    };
    let (executor, primary_handle, _) =
        build(primary, DriverScript::default(), ScriptedVisual::default());

    let outcome = executor
        .run(&Step::navigate("https://app.test/settings", 0))
        .await
        .unwrap();

    assert_eq!(outcome.strategy.as_deref(), Some("script_invoke"));
    assert_eq!(outcome.after.url.as_deref(), Some("https://app.test/settings"));
    assert!(primary_handle
        .calls()
        .contains(&"navigate(https://app.test/settings)".to_string()));
}

#[tokio::test]
async fn test_scroll_step_uses_the_configured_distance() {
    let primary = DriverScript {
        contents: two_pages("Top", "Further down"),
        ..Default::default()
    };
    let (executor, primary_handle, _) =
        build(primary, DriverScript::default(), ScriptedVisual::default());

    let outcome = executor.run(&Step::scroll(0)).await.unwrap();

    assert!(outcome.succeeded());
    assert!(primary_handle.calls().contains(&"scroll(600)".to_string()));
}

#[tokio::test(start_paused = true)]
async fn test_bootstrap_opens_and_snapshots_the_start_page() {
    let primary = DriverScript {
        contents: VecDeque::from([content_at("Landing", "https://app.test/")]),
        // The page never settles; bootstrap falls back to a grace pause.
        stall_quiescence: true,
        ..Default::default()
    };
    let (executor, primary_handle, _) =
        build(primary, DriverScript::default(), ScriptedVisual::default());

    let snapshot = executor.bootstrap("https://app.test/").await.unwrap();

    assert_eq!(snapshot.url.as_deref(), Some("https://app.test/"));
    assert!(primary_handle
        .calls()
        .contains(&"navigate(https://app.test/)".to_string()));
}

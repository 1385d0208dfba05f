//! Tests for step verdict classification

use crate::config::ValidatorConfig;
use crate::snapshot::PageSnapshot;
use crate::tests::mocks::{content, content_at};
use crate::types::{ActionOutcome, DriverLayer, Step};
use crate::validator::{StateValidator, Verdict};
use std::time::Duration;

fn snap(text: &str) -> PageSnapshot {
    PageSnapshot::from_content(&content(text))
}

fn snap_at(text: &str, url: &str) -> PageSnapshot {
    PageSnapshot::from_content(&content_at(text, url))
}

fn outcome(before: &PageSnapshot, after: &PageSnapshot) -> ActionOutcome {
    ActionOutcome {
        driver: DriverLayer::Layer1,
        strategy: Some("role_lookup".to_string()),
        elapsed: Duration::from_millis(25),
        failures: Vec::new(),
        before: before.clone(),
        after: after.clone(),
        after_image: None,
    }
}

fn validator() -> StateValidator {
    StateValidator::new(ValidatorConfig::default())
}

#[test]
fn test_wait_with_no_change_is_no_change() {
    let page = snap("Loading spinner");
    let verdict = validator().classify(
        &Step::wait(0),
        &outcome(&page, &page),
        std::slice::from_ref(&page),
    );
    assert_eq!(verdict.verdict, Verdict::NoChange);
    assert!(verdict.verdict.allows_progress());
    assert!(!verdict.verdict.is_retryable_failure());
}

#[test]
fn test_wait_that_saw_change_is_confirmed() {
    let before = snap("Loading spinner");
    let after = snap("Results table");
    let verdict = validator().classify(
        &Step::wait(0),
        &outcome(&before, &after),
        std::slice::from_ref(&before),
    );
    assert_eq!(verdict.verdict, Verdict::Confirmed);
}

#[test]
fn test_bounce_back_to_earlier_state_is_regression() {
    let a = snap_at("List view", "https://app.test/list");
    let b = snap_at("Detail view", "https://app.test/detail");
    // The page went A -> B, then this step landed back on A.
    let history = vec![a.clone(), b.clone()];
    let verdict = validator().classify(&Step::click("Back", 1), &outcome(&b, &a), &history);
    assert_eq!(verdict.verdict, Verdict::Regression);
    assert!(verdict.verdict.is_retryable_failure());
    assert!(verdict.rationale.contains("returned to a state"));
}

#[test]
fn test_unmoved_page_is_silent_failure_not_regression() {
    let page = snap("Form with disabled button");
    // History holds the same digest, but a page that never moved must not
    // be reported as having bounced back.
    let history = vec![page.clone()];
    let verdict = validator().classify(&Step::click("Submit", 0), &outcome(&page, &page), &history);
    assert_eq!(verdict.verdict, Verdict::SilentFailure);
    assert!(verdict.rationale.contains("did not change"));
}

#[test]
fn test_navigate_without_effect_is_silent_failure() {
    let page = snap_at("Home", "https://app.test/home");
    let verdict = validator().classify(
        &Step::navigate("https://app.test/home", 0),
        &outcome(&page, &page),
        std::slice::from_ref(&page),
    );
    assert_eq!(verdict.verdict, Verdict::SilentFailure);
}

#[test]
fn test_scroll_without_effect_is_not_a_silent_failure() {
    let page = snap("Short page");
    let verdict = validator().classify(
        &Step::scroll(0),
        &outcome(&page, &page),
        std::slice::from_ref(&page),
    );
    // Only must-change actions are held to the silent-failure rule.
    assert_eq!(verdict.verdict, Verdict::Confirmed);
}

#[test]
fn test_changed_page_is_confirmed() {
    let before = snap("Form");
    let after = snap("Form Thank you");
    let history = vec![before.clone()];
    let verdict = validator().classify(&Step::click("Submit", 0), &outcome(&before, &after), &history);
    assert_eq!(verdict.verdict, Verdict::Confirmed);
    assert!(verdict.rationale.contains("page changed"));
}

#[test]
fn test_regression_window_is_bounded() {
    let old = snap("State 0");
    let mut history = vec![old.clone()];
    for i in 1..=5 {
        history.push(snap(&format!("State {i}")));
    }
    let before = history.last().cloned().unwrap();

    // `old` sits six snapshots back, one past the window of five.
    let verdict = validator().classify(&Step::click("Back", 6), &outcome(&before, &old), &history);
    assert_eq!(verdict.verdict, Verdict::Confirmed);

    // A state within the window is still caught.
    let recent = history[3].clone();
    let verdict = validator().classify(&Step::click("Back", 6), &outcome(&before, &recent), &history);
    assert_eq!(verdict.verdict, Verdict::Regression);
}

//! End-to-end task runs through the engine facade

use crate::config::{EngineConfig, OrchestratorConfig};
use crate::tests::mocks::{
    content, content_at, element, DriverScript, MemorySink, ScriptedDriver, ScriptedPlanner,
    ScriptedVisual,
};
use crate::types::{ActionKind, Step, TaskRequest, TaskStatus};
use crate::validator::Verdict;
use crate::Engine;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn request() -> TaskRequest {
    TaskRequest {
        task_description: "archive the latest invoice".to_string(),
        start_url: "https://app.test/home".to_string(),
        app_identifier: "billing-portal".to_string(),
    }
}

fn engine_with(
    primary: DriverScript,
    planner: ScriptedPlanner,
    sink: Arc<MemorySink>,
    config: EngineConfig,
) -> (Engine, Arc<ScriptedDriver>, Arc<ScriptedPlanner>) {
    let primary = Arc::new(ScriptedDriver::new(primary));
    let planner = Arc::new(planner);
    let engine = Engine::new(
        primary.clone(),
        Arc::new(ScriptedDriver::new(DriverScript::default())),
        Arc::new(ScriptedVisual::default()),
        planner.clone(),
        config,
    )
    .with_sink(sink);
    (engine, primary, planner)
}

async fn run(engine: &Engine, task_id: &str) -> crate::types::TaskReport {
    engine
        .submit_task(task_id, &request(), CancellationToken::new())
        .await
}

#[tokio::test]
async fn test_two_step_task_completes_with_captures() {
    let script = DriverScript {
        find_results: VecDeque::from([Ok(element("archive-btn"))]),
        contents: VecDeque::from([
            content("Home dashboard"),
            content("Home dashboard"),
            content("Invoice archived"),
            content("Invoice archived"),
            content_at("Settings page", "https://app.test/settings"),
        ]),
        ..Default::default()
    };
    let plan = vec![
        Step::click("Archive", 0),
        Step::navigate("https://app.test/settings", 1),
    ];
    let sink = Arc::new(MemorySink::default());
    let (engine, _, _) = engine_with(
        script,
        ScriptedPlanner::with_plan(plan),
        sink.clone(),
        EngineConfig::default(),
    );

    let report = run(&engine, "task-happy").await;

    assert_eq!(report.status, TaskStatus::Completed);
    assert_eq!(report.steps_completed, 2);
    assert_eq!(report.task_id, "task-happy");
    assert!(report.error.is_none());
    assert_eq!(report.final_url.as_deref(), Some("https://app.test/settings"));

    assert_eq!(report.capture_list.len(), 2);
    let first = &report.capture_list[0];
    assert_eq!(first.step_index, 0);
    assert_eq!(first.action_kind, ActionKind::Click);
    assert_eq!(first.app_identifier, "billing-portal");
    assert!(first.stored_path.as_deref().unwrap().starts_with("mem://"));
    assert_eq!(report.capture_list[1].reward, 0.9);
    assert_eq!(sink.stored().len(), 2);

    let labels: Vec<&str> = report.commits.iter().map(|c| c.label.as_str()).collect();
    assert_eq!(
        labels,
        vec![
            "created",
            "snapshot+step:1+capture",
            "snapshot+step:2+capture",
            "status:completed",
        ]
    );
}

#[tokio::test]
async fn test_silent_failure_is_retried_until_the_page_moves() {
    let script = DriverScript {
        find_results: VecDeque::from([Ok(element("save-btn")), Ok(element("save-btn"))]),
        contents: VecDeque::from([
            content("Form"),
            content("Form"),
            content("Form"),
            content("Form"),
            content("Saved"),
        ]),
        ..Default::default()
    };
    let sink = Arc::new(MemorySink::default());
    let (engine, _, _) = engine_with(
        script,
        ScriptedPlanner::with_plan(vec![Step::click("Save", 0)]),
        sink.clone(),
        EngineConfig::default(),
    );

    let report = run(&engine, "task-retry").await;

    assert_eq!(report.status, TaskStatus::Completed);
    assert_eq!(report.steps_completed, 1);
    // The no-op attempt appended a snapshot but earned no capture.
    assert_eq!(report.capture_list.len(), 1);
    assert_eq!(report.commits[1].label, "snapshot");
    assert_eq!(report.commits[2].label, "snapshot+step:1+capture");
}

#[tokio::test]
async fn test_unreachable_step_leaves_the_task_stuck() {
    let script = DriverScript {
        contents: VecDeque::from([content("Home")]),
        ..Default::default()
    };
    let sink = Arc::new(MemorySink::default());
    let (engine, _, _) = engine_with(
        script,
        ScriptedPlanner::with_plan(vec![Step::click("Ghost", 0)]),
        sink.clone(),
        EngineConfig::default(),
    );

    let report = run(&engine, "task-stuck").await;

    assert_eq!(report.status, TaskStatus::Stuck);
    assert_eq!(report.steps_completed, 0);
    assert!(report.capture_list.is_empty());
    let error = report.error.unwrap();
    assert!(error.contains("3 consecutive attempts"), "got: {error}");
    assert_eq!(report.commits.last().unwrap().label, "status:stuck");
}

#[tokio::test]
async fn test_regression_replans_and_the_revised_plan_runs() {
    let script = DriverScript {
        find_results: VecDeque::from([Ok(element("next-btn")), Ok(element("next-btn"))]),
        contents: VecDeque::from([
            content("Page one"),
            content("Page one"),
            content("Page two"),
            content("Page two"),
            content("Page one"),
            content("Page one"),
            content_at("Reports", "https://app.test/reports"),
        ]),
        ..Default::default()
    };
    let planner = ScriptedPlanner::with_plans(vec![
        Ok(vec![Step::click("Next", 0), Step::click("Next", 1)]),
        Ok(vec![Step::navigate("https://app.test/reports", 1)]),
    ]);
    let sink = Arc::new(MemorySink::default());
    let (engine, _, planner) = engine_with(script, planner, sink.clone(), EngineConfig::default());

    let report = run(&engine, "task-replan").await;

    assert_eq!(report.status, TaskStatus::Completed);
    assert_eq!(report.steps_completed, 2);
    // The bounced-back state is documented too, flagged by its verdict.
    assert_eq!(report.capture_list.len(), 3);
    assert_eq!(report.capture_list[1].verdict, Verdict::Regression);

    let reasons = planner.revision_reasons();
    assert_eq!(reasons.len(), 2);
    assert!(reasons[0].is_none());
    assert!(reasons[1].as_deref().unwrap().contains("returned to a state"));
}

#[tokio::test]
async fn test_step_budget_bounds_a_task_that_stalls() {
    let script = DriverScript {
        find_results: VecDeque::from([Ok(element("save-btn")), Ok(element("save-btn"))]),
        contents: VecDeque::from([content("Form")]),
        ..Default::default()
    };
    let config = EngineConfig {
        orchestrator: OrchestratorConfig {
            step_budget: 2,
            ..Default::default()
        },
        ..Default::default()
    };
    let sink = Arc::new(MemorySink::default());
    let (engine, _, _) = engine_with(
        script,
        ScriptedPlanner::with_plan(vec![Step::click("Save", 0)]),
        sink.clone(),
        config,
    );

    let report = run(&engine, "task-budget").await;

    assert_eq!(report.status, TaskStatus::Failed);
    let error = report.error.unwrap();
    assert!(error.contains("step budget of 2 exhausted"), "got: {error}");
}

#[tokio::test]
async fn test_cancellation_stops_before_the_next_step() {
    let script = DriverScript {
        contents: VecDeque::from([content("Home")]),
        ..Default::default()
    };
    let sink = Arc::new(MemorySink::default());
    let (engine, primary, _) = engine_with(
        script,
        ScriptedPlanner::with_plan(vec![Step::click("Archive", 0)]),
        sink.clone(),
        EngineConfig::default(),
    );

    let cancel = CancellationToken::new();
    cancel.cancel();
    let report = engine.submit_task("task-cancel", &request(), cancel).await;

    assert_eq!(report.status, TaskStatus::Failed);
    assert_eq!(report.error.as_deref(), Some("cancelled"));
    assert_eq!(report.steps_completed, 0);
    // Only the start page was opened; no step ever reached the driver.
    assert_eq!(
        primary.calls(),
        vec!["navigate(https://app.test/home)".to_string()]
    );
}

#[tokio::test]
async fn test_planner_failure_before_the_first_step_fails_the_task() {
    let script = DriverScript {
        contents: VecDeque::from([content("Home")]),
        ..Default::default()
    };
    let sink = Arc::new(MemorySink::default());
    let (engine, _, _) = engine_with(
        script,
        ScriptedPlanner::failing("model overloaded"),
        sink.clone(),
        EngineConfig::default(),
    );

    let report = run(&engine, "task-noplan").await;

    assert_eq!(report.status, TaskStatus::Failed);
    assert!(report.error.unwrap().contains("no initial plan"));
}

#[tokio::test]
async fn test_empty_plan_completes_immediately() {
    let script = DriverScript {
        contents: VecDeque::from([content("Home")]),
        ..Default::default()
    };
    let sink = Arc::new(MemorySink::default());
    let (engine, _, _) = engine_with(
        script,
        ScriptedPlanner::with_plan(Vec::new()),
        sink.clone(),
        EngineConfig::default(),
    );

    let report = run(&engine, "task-empty").await;

    assert_eq!(report.status, TaskStatus::Completed);
    assert_eq!(report.steps_completed, 0);
    assert!(report.capture_list.is_empty());
    let labels: Vec<&str> = report.commits.iter().map(|c| c.label.as_str()).collect();
    assert_eq!(labels, vec!["created", "status:completed"]);
}

#[tokio::test]
async fn test_revisited_state_is_not_captured_twice() {
    // Two navigations land on pages with identical text; only the first
    // transition is worth keeping.
    let script = DriverScript {
        contents: VecDeque::from([
            content_at("Start", "https://app.test/"),
            content_at("Start", "https://app.test/"),
            content_at("Landing copy", "https://app.test/a"),
            content_at("Landing copy", "https://app.test/a"),
            content_at("Landing copy", "https://app.test/b"),
        ]),
        ..Default::default()
    };
    let plan = vec![
        Step::navigate("https://app.test/a", 0),
        Step::navigate("https://app.test/b", 1),
    ];
    let sink = Arc::new(MemorySink::default());
    let (engine, _, _) = engine_with(
        script,
        ScriptedPlanner::with_plan(plan),
        sink.clone(),
        EngineConfig::default(),
    );

    let report = run(&engine, "task-dupe").await;

    assert_eq!(report.status, TaskStatus::Completed);
    assert_eq!(report.steps_completed, 2);
    assert_eq!(report.capture_list.len(), 1);
    assert_eq!(sink.stored().len(), 1);
}

#[tokio::test]
async fn test_refusing_sink_is_tolerated_by_default() {
    let script = DriverScript {
        find_results: VecDeque::from([Ok(element("archive-btn"))]),
        contents: VecDeque::from([
            content("Home"),
            content("Home"),
            content("Archived"),
        ]),
        ..Default::default()
    };
    let sink = Arc::new(MemorySink::failing());
    let (engine, _, _) = engine_with(
        script,
        ScriptedPlanner::with_plan(vec![Step::click("Archive", 0)]),
        sink.clone(),
        EngineConfig::default(),
    );

    let report = run(&engine, "task-sink-soft").await;

    assert_eq!(report.status, TaskStatus::Completed);
    assert_eq!(report.steps_completed, 1);
    assert!(report.capture_list.is_empty());
    assert!(sink.stored().is_empty());
}

#[tokio::test]
async fn test_required_sink_refusal_fails_the_task() {
    let script = DriverScript {
        find_results: VecDeque::from([Ok(element("archive-btn"))]),
        contents: VecDeque::from([
            content("Home"),
            content("Home"),
            content("Archived"),
        ]),
        ..Default::default()
    };
    let config = EngineConfig {
        orchestrator: OrchestratorConfig {
            require_capture_sink: true,
            ..Default::default()
        },
        ..Default::default()
    };
    let sink = Arc::new(MemorySink::failing());
    let (engine, _, _) = engine_with(
        script,
        ScriptedPlanner::with_plan(vec![Step::click("Archive", 0)]),
        sink.clone(),
        config,
    );

    let report = run(&engine, "task-sink-hard").await;

    assert_eq!(report.status, TaskStatus::Failed);
    assert!(report.error.unwrap().contains("required sink refused"));
}

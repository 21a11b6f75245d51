//! Plan execution integration tests.
//!
//! These tests run plans through the orchestrator the way the planning layer
//! does: inline, hosted as scheduler tasks, updated live and cancelled.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use commander::blackboard::{ns, RUN_END_TIME, RUN_PLAN, RUN_START_TIME, RUN_STATUS};
use commander::config::Config;
use commander::core::{Action, Plan, TaskStatus};
use commander::orchestration::{Interpreter, RunStatus, SerialFailurePolicy};
use commander::{Error, Orchestrator};

use crate::fixtures::{config_dir, four_action_plan, nap, orchestrator, tagged, tags, Recorder};

/// Test: Parallel-then-serial ordering
/// Given a parallel stage A,B followed by a serial stage C,D
/// When the plan runs under id r1
/// Then four outcomes are recorded, A/B in any order, then C, then D
#[tokio::test(start_paused = true)]
async fn test_four_action_plan_ordering() {
    let orch = orchestrator();
    let report = orch.execute_subtask(four_action_plan(), "r1").await.unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.results.len(), 4);
    let order = tags(&report.results);
    assert!(order[..2].contains(&"A".to_string()));
    assert!(order[..2].contains(&"B".to_string()));
    assert_eq!(order[2..], ["C", "D"]);

    let bb = orch.blackboard();
    assert_eq!(bb.get(&ns("r1", RUN_STATUS), Value::Null).await, json!("completed"));
    assert!(bb.exists(&ns("r1", RUN_START_TIME)).await);
    assert!(bb.exists(&ns("r1", RUN_END_TIME)).await);
}

/// Test: Concurrent runs stay isolated
/// Given two plans submitted at once under different run ids
/// When both finish
/// Then each run's keys hold only its own plan and status
#[tokio::test(start_paused = true)]
async fn test_concurrent_runs_are_isolated() {
    let orch = orchestrator();
    let plan_a = Plan::new().serial(vec![nap(30, "a1"), nap(30, "a2")]);
    let plan_b = Plan::new().parallel(vec![tagged("fail", "b1")]);

    let a = orch.submit_run(plan_a.clone(), "alpha").unwrap();
    let b = orch.submit_run(plan_b.clone(), "bravo").unwrap();
    let report_a = a.wait().await.unwrap();
    let report_b = b.wait().await.unwrap();

    assert_eq!(tags(&report_a.results), vec!["a1", "a2"]);
    assert_eq!(report_b.failed(), 1);

    let bb = orch.blackboard();
    let stored_a: Option<Plan> = bb.get_typed(&ns("alpha", RUN_PLAN)).await.unwrap();
    let stored_b: Option<Plan> = bb.get_typed(&ns("bravo", RUN_PLAN)).await.unwrap();
    assert_eq!(stored_a, Some(plan_a));
    assert_eq!(stored_b, Some(plan_b));
    assert_eq!(bb.list_keys("run:alpha:").await.len(), 4);
}

/// Test: Live plan update mid-run
/// Given a hosted run of a serial stage whose first action takes a while
/// When the plan is replaced while that action runs
/// Then the remaining serial actions come from the new plan
#[tokio::test(start_paused = true)]
async fn test_live_plan_update() {
    let recorder = Recorder::default();
    let orch = Orchestrator::new(Config::default(), recorder.registry());
    let original = Plan::new().serial(vec![
        nap(100, "scout"),
        tagged("record", "old-1"),
        tagged("record", "old-2"),
    ]);
    let handle = orch.submit_run(original, "r1").unwrap();

    tokio::time::sleep(Duration::from_millis(10)).await;
    let updated = Plan::new().serial(vec![
        nap(100, "scout"),
        tagged("record", "new-1"),
        tagged("record", "new-2"),
        tagged("record", "new-3"),
    ]);
    orch.update_plan("r1", &updated).await.unwrap();

    let report = handle.wait().await.unwrap();
    assert_eq!(recorder.seen(), vec!["new-1", "new-2", "new-3"]);
    assert_eq!(tags(&report.results), vec!["scout", "new-1", "new-2", "new-3"]);
}

/// Test: A parallel failure never cancels siblings
/// Given a parallel stage with one failing and two succeeding actions
/// When it runs
/// Then all three outcomes are recorded and the run completes
#[tokio::test(start_paused = true)]
async fn test_parallel_failure_isolated() {
    let recorder = Recorder::default();
    let orch = Orchestrator::new(Config::default(), recorder.registry());
    let plan = Plan::new().parallel(vec![
        tagged("fail", "x"),
        tagged("record", "y"),
        nap(50, "z"),
    ]);

    let report = orch.execute_subtask(plan, "r1").await.unwrap();
    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.results.len(), 3);
    assert_eq!(report.failed(), 1);
    assert_eq!(recorder.seen(), vec!["y"]);
}

/// Test: Serial abort policy from config
/// Given a config file selecting the abort policy
/// When a serial stage hits a failing action
/// Then the run stops there and is reported failed
#[tokio::test]
async fn test_abort_policy_from_config() {
    let (_dir, path) = config_dir("[interpreter]\nserial_failure = \"abort\"\n");
    let config = Config::load_from(&path).unwrap();
    assert_eq!(config.interpreter.serial_failure, SerialFailurePolicy::Abort);

    let recorder = Recorder::default();
    let orch = Orchestrator::new(config, recorder.registry());
    let plan = Plan::new().serial(vec![
        tagged("record", "before"),
        Action::new("fail").with_param("message", "wall in the way"),
        tagged("record", "after"),
    ]);

    let report = orch.execute_subtask(plan, "r1").await.unwrap();
    assert_eq!(report.status, RunStatus::Failed);
    assert!(report.error.unwrap().contains("wall in the way"));
    assert_eq!(recorder.seen(), vec!["before"]);
    assert_eq!(orch.run_status("r1").await, Some(RunStatus::Failed));
}

/// Test: Cancelling a hosted run
/// Given a run stuck in a long serial action
/// When it is cancelled
/// Then its task is Cancelled, out of the running set, and later actions never run
#[tokio::test(start_paused = true)]
async fn test_cancel_hosted_run() {
    let recorder = Recorder::default();
    let orch = Orchestrator::new(Config::default(), recorder.registry());
    let plan = Plan::new().serial(vec![nap(3_600_000, "wait"), tagged("record", "late")]);

    let handle = orch.submit_run(plan, "r1").unwrap();
    let task_id = handle.task_id();
    tokio::time::sleep(Duration::from_millis(5)).await;

    assert!(orch.cancel_run("r1").await);
    assert!(!orch.tasks().get_running_tasks().contains(&task_id));
    assert_eq!(orch.tasks().get_task_status(task_id), Some(TaskStatus::Cancelled));
    assert!(matches!(handle.wait().await, Err(Error::TaskCancelled(_))));

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(recorder.seen().is_empty());
    assert_eq!(orch.run_status("r1").await, Some(RunStatus::Cancelled));
}

/// Test: Cancellation is never reported as failure
/// Given an inline run under the abort policy stuck in a long serial action
/// When the orchestrator shuts down
/// Then the run ends Cancelled, not Failed, and later actions never run
#[tokio::test(start_paused = true)]
async fn test_cancelled_inline_run_under_abort_policy() {
    let mut config = Config::default();
    config.interpreter.serial_failure = SerialFailurePolicy::Abort;
    let recorder = Recorder::default();
    let orch = Orchestrator::new(config, recorder.registry());
    let plan = Plan::new().serial(vec![nap(3_600_000, "hold"), tagged("record", "late")]);

    let run = orch.execute_subtask(plan, "r1");
    tokio::pin!(run);
    tokio::select! {
        _ = &mut run => panic!("run ended before shutdown"),
        _ = tokio::time::sleep(Duration::from_millis(10)) => {}
    }
    assert_eq!(orch.active_runs(), vec!["r1"]);
    orch.shutdown().await;

    let report = run.await.unwrap();
    assert_eq!(report.status, RunStatus::Cancelled);
    assert!(matches!(report.check(), Err(Error::RunEnded { .. })));
    assert!(recorder.seen().is_empty());
    assert_eq!(orch.run_status("r1").await, Some(RunStatus::Cancelled));
}

/// Test: Action deadline surfaces as a failed outcome
/// Given a config with a one-second action timeout
/// When an action sleeps for a minute
/// Then its outcome is a timeout failure and the next action still runs
#[tokio::test(start_paused = true)]
async fn test_action_timeout_from_config() {
    let mut config = Config::default();
    config.interpreter.action_timeout_secs = Some(1);
    let orch = Orchestrator::new(config, commander::orchestration::builtin_registry());
    let plan = Plan::new().serial(vec![nap(60_000, "slow"), tagged("echo", "next")]);

    let report = orch.execute_subtask(plan, "r1").await.unwrap();
    assert!(!report.results[0].ok);
    assert!(report.results[0].error.as_deref().unwrap().contains("timed out"));
    assert!(report.results[1].ok);
}

/// Test: Incremental driving
/// Given an interpreter over a serial stage
/// When it is stepped by hand
/// Then results grow one action per step
#[tokio::test]
async fn test_incremental_stepping() {
    let recorder = Recorder::default();
    let plan = Plan::new().serial(vec![tagged("record", "1"), tagged("record", "2")]);
    let mut interpreter = Interpreter::new(plan, Arc::new(recorder.registry()));

    interpreter.step().await;
    assert_eq!(recorder.seen(), vec!["1"]);
    assert_eq!(interpreter.results().len(), 1);

    interpreter.step().await;
    assert_eq!(recorder.seen(), vec!["1", "2"]);
    assert!(!interpreter.is_finished());
    interpreter.step().await;
    assert!(interpreter.is_finished());
}

/// Test: Plans parse from the JSON wire shape
/// Given a plan as the planning layer sends it
/// When it is parsed and run
/// Then every action reaches its handler with its parameters
#[tokio::test]
async fn test_plan_from_json() {
    let plan = Plan::from_json(
        r#"[
            {"kind": "parallel", "actions": [{"type": "echo", "unit": "marine"}]},
            {"kind": "serial", "actions": [{"type": "echo", "to": [10, 20]}]}
        ]"#,
    )
    .unwrap();
    let orch = orchestrator();

    let report = orch.execute_subtask(plan, "json").await.unwrap();
    assert_eq!(report.results[0].output, Some(json!({"unit": "marine"})));
    assert_eq!(report.results[1].output, Some(json!({"to": [10, 20]})));
    assert!(Plan::from_json(r#"[{"kind": "diagonal", "actions": []}]"#).is_err());
}

/// Test: Run history is bounded
/// Given a history capacity of two
/// When three runs finish
/// Then only the two newest are kept
#[tokio::test]
async fn test_run_history_is_bounded() {
    let mut config = Config::default();
    config.runs.history_capacity = 2;
    let orch = Orchestrator::new(config, commander::orchestration::builtin_registry());

    for run in ["one", "two", "three"] {
        orch.execute_subtask(Plan::new().serial(vec![Action::new("echo")]), run)
            .await
            .unwrap();
    }
    let recent: Vec<String> = orch.recent_runs(10).into_iter().map(|r| r.run_id).collect();
    assert_eq!(recent, vec!["three", "two"]);
}

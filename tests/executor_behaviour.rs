// tests/executor_behaviour.rs

use std::error::Error;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use anyhow::anyhow;
use chrono::Utc;

use pipedag::dag::{Decision, DependencyGraph, RunScheduler, RunState};
use pipedag::exec::{Operation, async_operation};
use pipedag::pipeline::{Pipeline, Task};
use pipedag::types::{TaskStatus, Value};
use pipedag::{Executor, ExecutorOptions};
use pipedag_test_utils::{
    CallLog, ConcurrencyProbe, FlakyOperation, init_tracing, sleepy, succeed, task, with_timeout,
};
use serde_json::json;
use tokio_util::sync::CancellationToken;

type TestResult = Result<(), Box<dyn Error>>;

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn retries_until_success_within_budget() -> TestResult {
    init_tracing();
    let flaky = FlakyOperation::new(2);
    let op: Arc<dyn Operation> = flaky.clone();

    let mut pipeline = Pipeline::new("flaky");
    pipeline.add_task(Task::builder("unstable", op).retries(2).build())?;

    let statuses = with_timeout(pipeline.run()).await?;

    assert_eq!(statuses["unstable"], TaskStatus::Completed);
    let t = pipeline.task("unstable").expect("exists");
    assert_eq!(t.attempts(), 3);
    assert_eq!(flaky.calls(), 3);
    assert!(t.error().is_none(), "success clears the previous error");
    assert_eq!(t.output(), Some(&json!({"succeeded_on_call": 3})));
    Ok(())
}

#[tokio::test]
async fn exhausted_retry_budget_fails_with_last_error() -> TestResult {
    let flaky = FlakyOperation::new(5);
    let op: Arc<dyn Operation> = flaky.clone();

    let mut pipeline = Pipeline::new("flaky");
    pipeline.add_task(Task::builder("unstable", op).retries(1).build())?;

    let statuses = with_timeout(pipeline.run()).await?;

    assert_eq!(statuses["unstable"], TaskStatus::Failed);
    assert_eq!(flaky.calls(), 2);
    let err = pipeline
        .task("unstable")
        .and_then(Task::error)
        .unwrap_or_default();
    assert!(err.contains("flaky failure #2"), "got {err}");
    Ok(())
}

#[tokio::test]
async fn retry_delay_spaces_out_attempts() -> TestResult {
    let flaky = FlakyOperation::new(1);
    let op: Arc<dyn Operation> = flaky.clone();

    let mut pipeline = Pipeline::new("delay");
    pipeline.add_task(
        Task::builder("slow_retry", op)
            .retries(1)
            .retry_delay(Duration::from_millis(100))
            .build(),
    )?;

    let run_began = Utc::now();
    let started = Instant::now();
    let statuses = with_timeout(pipeline.run()).await?;

    assert_eq!(statuses["slow_retry"], TaskStatus::Completed);
    assert!(started.elapsed() >= Duration::from_millis(100));

    // The recorded timestamps belong to the second attempt, which only
    // starts after the delay.
    let t = pipeline.task("slow_retry").expect("exists");
    assert_eq!(t.attempts(), 2);
    let attempt_started = t.started_at().expect("started_at recorded");
    let attempt_finished = t.finished_at().expect("finished_at recorded");
    assert!(
        (attempt_started - run_began).num_milliseconds() >= 100,
        "last attempt started {}ms into the run",
        (attempt_started - run_began).num_milliseconds()
    );
    assert!(attempt_finished >= attempt_started);
    Ok(())
}

#[tokio::test]
async fn crash_during_retry_counts_the_crashed_attempt() -> TestResult {
    init_tracing();
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let op = async_operation(move |_| {
        let call = counter.fetch_add(1, Ordering::SeqCst) + 1;
        async move {
            if call > 1 {
                panic!("operation blew up on attempt {call}");
            }
            Err::<Value, _>(anyhow!("first attempt fails"))
        }
    });

    let mut pipeline = Pipeline::new("crash_on_retry");
    pipeline.add_task(Task::builder("fragile", op).retries(1).build())?;
    pipeline.add_task(task("downstream", succeed(json!(1)), &["fragile"]))?;

    let statuses = with_timeout(pipeline.run()).await?;

    assert_eq!(statuses["fragile"], TaskStatus::Failed);
    assert_eq!(statuses["downstream"], TaskStatus::Skipped);
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let fragile = pipeline.task("fragile").expect("exists");
    assert_eq!(fragile.attempts(), 2);
    let err = fragile.error().unwrap_or_default();
    assert!(err.contains("worker crashed"), "got {err}");
    let started = fragile.started_at().expect("crashed attempt is timestamped");
    assert!(fragile.finished_at().is_some_and(|f| f >= started));
    Ok(())
}

#[tokio::test]
async fn attempt_exceeding_timeout_fails() -> TestResult {
    init_tracing();
    let mut pipeline = Pipeline::new("timeouts");
    pipeline.add_task(
        Task::builder("slow", sleepy(Duration::from_secs(2), json!("late")))
            .timeout(Duration::from_millis(50))
            .retries(1)
            .build(),
    )?;
    pipeline.add_task(task("after_slow", succeed(json!(1)), &["slow"]))?;

    let statuses = with_timeout(pipeline.run()).await?;

    assert_eq!(statuses["slow"], TaskStatus::Failed);
    assert_eq!(statuses["after_slow"], TaskStatus::Skipped);

    let slow = pipeline.task("slow").expect("exists");
    assert_eq!(slow.attempts(), 2);
    let err = slow.error().unwrap_or_default();
    assert!(err.contains("exceeded its timeout"), "got {err}");
    assert!(slow.output().is_none());
    Ok(())
}

#[tokio::test]
async fn max_concurrency_bounds_parallelism() -> TestResult {
    init_tracing();
    let probe = ConcurrencyProbe::new();
    let mut pipeline = Pipeline::new("bounded");
    for i in 0..6 {
        pipeline.add_task(task(&format!("t{i}"), probe.operation(Duration::from_millis(40)), &[]))?;
    }

    let executor = Executor::new(ExecutorOptions { max_concurrency: 2 });
    let statuses = with_timeout(pipeline.run_with(&executor, CancellationToken::new())).await?;

    assert!(statuses.values().all(|s| *s == TaskStatus::Completed));
    assert_eq!(probe.max_observed(), 2);
    Ok(())
}

#[tokio::test]
async fn independent_tasks_overlap_when_allowed() -> TestResult {
    let probe = ConcurrencyProbe::new();
    let mut pipeline = Pipeline::new("parallel");
    for name in ["a", "b", "c"] {
        pipeline.add_task(task(name, probe.operation(Duration::from_millis(100)), &[]))?;
    }
    pipeline.add_task(task("join", probe.operation(Duration::from_millis(1)), &["a", "b", "c"]))?;

    let executor = Executor::with_max_concurrency(8);
    let started = Instant::now();
    let statuses = with_timeout(pipeline.run_with(&executor, CancellationToken::new())).await?;

    assert!(statuses.values().all(|s| *s == TaskStatus::Completed));
    assert_eq!(probe.max_observed(), 3);
    assert!(
        started.elapsed() < Duration::from_millis(290),
        "branches should run side by side"
    );
    Ok(())
}

#[tokio::test]
async fn sequential_executor_follows_topological_order() -> TestResult {
    let log = CallLog::new();
    let mut pipeline = Pipeline::new("sequential");
    pipeline.add_task(task("extract", log.operation("extract"), &[]))?;
    pipeline.add_task(task("audit", log.operation("audit"), &[]))?;
    pipeline.add_task(task("transform", log.operation("transform"), &["extract"]))?;
    pipeline.add_task(task("load", log.operation("load"), &["transform", "audit"]))?;

    let executor = Executor::with_max_concurrency(1);
    with_timeout(pipeline.run_with(&executor, CancellationToken::new())).await?;

    assert_eq!(log.calls(), pipeline.execution_order()?);
    assert_eq!(log.calls(), vec!["extract", "audit", "transform", "load"]);
    Ok(())
}

#[tokio::test]
async fn cancelled_before_start_skips_everything() -> TestResult {
    let log = CallLog::new();
    let mut pipeline = Pipeline::new("cancelled");
    pipeline.add_task(task("A", log.operation("A"), &[]))?;
    pipeline.add_task(task("B", log.operation("B"), &["A"]))?;

    let cancel = CancellationToken::new();
    cancel.cancel();
    let statuses = with_timeout(pipeline.run_with(&Executor::default(), cancel)).await?;

    assert!(statuses.values().all(|s| *s == TaskStatus::Skipped));
    assert!(log.calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn cancellation_lets_running_task_finish_and_skips_the_rest() -> TestResult {
    init_tracing();
    let mut pipeline = Pipeline::new("cancel_mid_run");
    pipeline.add_task(task("first", sleepy(Duration::from_millis(150), json!("done")), &[]))?;
    pipeline.add_task(task("second", succeed(json!(2)), &["first"]))?;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        trigger.cancel();
    });

    let statuses = with_timeout(pipeline.run_with(&Executor::default(), cancel)).await?;

    assert_eq!(statuses["first"], TaskStatus::Completed);
    assert_eq!(statuses["second"], TaskStatus::Skipped);
    Ok(())
}

#[test]
fn scheduler_dispatches_within_capacity_and_cascades_skips() -> TestResult {
    let mut graph = DependencyGraph::new();
    graph.add_task_with_dependencies("A", &[])?;
    graph.add_task_with_dependencies("B", &[])?;
    graph.add_task_with_dependencies("C", &names(&["A"]))?;
    graph.add_task_with_dependencies("D", &names(&["C"]))?;

    let mut scheduler = RunScheduler::from_graph(&graph)?;
    assert_eq!(scheduler.order(), names(&["A", "B", "C", "D"]).as_slice());

    assert_eq!(scheduler.poll(1), vec![Decision::Dispatch("A".into())]);
    assert_eq!(scheduler.in_flight(), 1);
    assert!(scheduler.poll(0).is_empty());

    scheduler.finish("A", TaskStatus::Failed);
    let decisions = scheduler.poll(1);
    assert_eq!(
        decisions,
        vec![
            Decision::Dispatch("B".into()),
            Decision::Skip { task: "C".into(), blocked_by: "A".into() },
            Decision::Skip { task: "D".into(), blocked_by: "C".into() },
        ]
    );
    assert_eq!(scheduler.state_of("D"), Some(RunState::Done(TaskStatus::Skipped)));
    assert!(!scheduler.is_finished());

    scheduler.finish("B", TaskStatus::Completed);
    assert!(scheduler.is_finished());
    Ok(())
}

#[test]
fn scheduler_cancel_skips_waiting_tasks_only() -> TestResult {
    let mut graph = DependencyGraph::new();
    graph.add_task_with_dependencies("A", &[])?;
    graph.add_task_with_dependencies("B", &names(&["A"]))?;
    graph.add_task_with_dependencies("C", &[])?;

    let mut scheduler = RunScheduler::from_graph(&graph)?;
    assert_eq!(scheduler.poll(1), vec![Decision::Dispatch("A".into())]);

    let skipped = scheduler.cancel();
    assert_eq!(skipped, names(&["B", "C"]));
    assert!(scheduler.is_running("A"));
    assert!(scheduler.poll(4).is_empty());

    scheduler.finish("A", TaskStatus::Completed);
    assert!(scheduler.is_finished());
    Ok(())
}

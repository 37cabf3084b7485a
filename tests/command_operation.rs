// tests/command_operation.rs

#![cfg(unix)]

use std::error::Error;
use std::sync::Arc;
use std::time::{Duration, Instant};

use pipedag::exec::{CommandOperation, Operation};
use pipedag::pipeline::{Pipeline, Task};
use pipedag::types::TaskStatus;
use pipedag_test_utils::{init_tracing, with_timeout};
use serde_json::json;

type TestResult = Result<(), Box<dyn Error>>;

#[tokio::test]
async fn stdout_json_becomes_the_output() -> TestResult {
    init_tracing();
    let op = CommandOperation::new(r#"echo '{"ok": true, "n": 2}'"#);
    let out = with_timeout(op.invoke(None)).await?;
    assert_eq!(out, json!({"ok": true, "n": 2}));
    Ok(())
}

#[tokio::test]
async fn plain_stdout_becomes_a_trimmed_string() -> TestResult {
    let op = CommandOperation::new("echo '  hello world  '");
    assert_eq!(with_timeout(op.invoke(None)).await?, json!("hello world"));

    let silent = CommandOperation::new("true");
    assert_eq!(with_timeout(silent.invoke(None)).await?, json!(null));
    Ok(())
}

#[tokio::test]
async fn input_is_written_to_stdin_as_json() -> TestResult {
    let op = CommandOperation::new("cat");
    let input = json!({"upstream": [1, 2, 3]});
    let out = with_timeout(op.invoke(Some(input.clone()))).await?;
    assert_eq!(out, input);
    Ok(())
}

#[tokio::test]
async fn env_and_working_directory_are_applied() -> TestResult {
    let dir = tempfile::tempdir()?;
    std::fs::write(dir.path().join("marker.txt"), "present")?;

    let op = CommandOperation::new("printf '%s-%s' \"$GREETING\" \"$(cat marker.txt)\"")
        .current_dir(dir.path())
        .env("GREETING", "hi");
    assert_eq!(op.describe(), op.cmd());

    let out = with_timeout(op.invoke(None)).await?;
    assert_eq!(out, json!("hi-present"));
    Ok(())
}

#[tokio::test]
async fn non_zero_exit_reports_code_and_last_stderr_line() -> TestResult {
    let op = CommandOperation::new("echo first >&2; echo 'disk full' >&2; exit 3");
    let err = with_timeout(op.invoke(None))
        .await
        .expect_err("non-zero exit must fail");

    let msg = format!("{err:#}");
    assert!(msg.contains("code 3"), "got {msg}");
    assert!(msg.contains("disk full"), "got {msg}");
    assert!(!msg.contains("first"), "only the last stderr line is kept: {msg}");
    Ok(())
}

#[tokio::test]
async fn timed_out_command_is_killed() -> TestResult {
    let op: Arc<dyn Operation> = Arc::new(CommandOperation::new("sleep 5"));
    let mut pipeline = Pipeline::new("kill");
    pipeline.add_task(
        Task::builder("sleeper", op)
            .timeout(Duration::from_millis(100))
            .retries(0)
            .build(),
    )?;

    let started = Instant::now();
    let statuses = with_timeout(pipeline.run()).await?;

    assert_eq!(statuses["sleeper"], TaskStatus::Failed);
    assert!(started.elapsed() < Duration::from_secs(2));
    Ok(())
}

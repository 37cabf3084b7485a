// src/exec/task_runner.rs

//! Drives a single task through validation, attempts and transformation.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::{TaskOutcome, WorkerEvent};
use crate::errors::PipelineError;
use crate::exec::Operation;
use crate::pipeline::hooks::{TransformationHook, ValidationHook};
use crate::types::{TaskName, Value};

/// Everything a worker needs to run one task. Owned, so the worker never
/// touches pipeline state.
pub struct TaskJob {
    pub name: TaskName,
    pub operation: Arc<dyn Operation>,
    pub input: Option<Value>,
    pub retries: u32,
    pub timeout: Duration,
    pub retry_delay: Duration,
    pub validation: Option<ValidationHook>,
    pub transformation: Option<TransformationHook>,
    pub run_id: u64,
}

/// Run `job` to a final outcome, reporting each step on `events`.
///
/// - The validation hook runs once, inside the first attempt, before the
///   operation. Its failure (or panic) is final.
/// - Each attempt is bounded by `job.timeout`; an elapsed timeout drops the
///   operation future and counts as a failed attempt.
/// - Failed attempts are retried up to `job.retries` times. Once `cancel`
///   fires no new attempt starts and the last failure becomes final.
/// - The transformation hook sees the operation's output; its failure is
///   final since the operation itself succeeded.
pub async fn run_task(job: TaskJob, events: mpsc::Sender<WorkerEvent>, cancel: CancellationToken) {
    let max_attempts = job.retries.saturating_add(1);

    for attempt in 1..=max_attempts {
        let started = WorkerEvent::AttemptStarted {
            task: job.name.clone(),
            attempt,
            at: Utc::now(),
        };
        if !emit(&events, started).await {
            return;
        }

        if attempt == 1 {
            if let Some(hook) = &job.validation {
                if let Err(e) = run_validation(hook.clone(), job.input.clone()).await {
                    warn!(task = %job.name, run_id = job.run_id, error = %e, "validation hook rejected task");
                    let failure = PipelineError::ValidationFailed {
                        task: job.name.clone(),
                        message: format!("{e:#}"),
                    };
                    finish(&events, &job, attempt, TaskOutcome::Failed(failure), false).await;
                    return;
                }
            }
        }

        match run_attempt(&job, attempt).await {
            Ok(output) => {
                let outcome = match &job.transformation {
                    Some(hook) => match run_transformation(hook.clone(), output).await {
                        Ok(transformed) => TaskOutcome::Success(transformed),
                        Err(e) => {
                            warn!(task = %job.name, run_id = job.run_id, error = %e, "transformation hook failed");
                            TaskOutcome::Failed(PipelineError::TransformationFailed {
                                task: job.name.clone(),
                                message: format!("{e:#}"),
                            })
                        }
                    },
                    None => TaskOutcome::Success(output),
                };
                finish(&events, &job, attempt, outcome, false).await;
                return;
            }
            Err(failure) => {
                let failed_at = Utc::now();
                let mut will_retry = attempt < max_attempts && !cancel.is_cancelled();

                if will_retry && !job.retry_delay.is_zero() {
                    tokio::select! {
                        _ = sleep(job.retry_delay) => {}
                        _ = cancel.cancelled() => {
                            will_retry = false;
                        }
                    }
                }

                if will_retry {
                    warn!(
                        task = %job.name,
                        run_id = job.run_id,
                        attempt,
                        max_attempts,
                        error = %failure,
                        "attempt failed; retrying"
                    );
                } else if cancel.is_cancelled() && attempt < max_attempts {
                    info!(task = %job.name, run_id = job.run_id, attempt, "run cancelled; not retrying");
                }

                let event = WorkerEvent::AttemptFinished {
                    task: job.name.clone(),
                    attempt,
                    outcome: TaskOutcome::Failed(failure),
                    at: failed_at,
                    will_retry,
                };
                if !emit(&events, event).await || !will_retry {
                    return;
                }
            }
        }
    }
}

/// Hooks are plain closures; like `FnOperation` they run on the blocking
/// pool so a slow hook never stalls a runtime thread. A panicking hook is
/// reported as a hook error.
async fn run_validation(hook: ValidationHook, input: Option<Value>) -> anyhow::Result<()> {
    tokio::task::spawn_blocking(move || hook(input.as_ref()))
        .await
        .context("validation hook panicked")?
}

async fn run_transformation(hook: TransformationHook, output: Value) -> anyhow::Result<Value> {
    tokio::task::spawn_blocking(move || hook(output))
        .await
        .context("transformation hook panicked")?
}

/// One invocation of the operation under the task's timeout.
async fn run_attempt(job: &TaskJob, attempt: u32) -> Result<Value, PipelineError> {
    debug!(
        task = %job.name,
        run_id = job.run_id,
        attempt,
        timeout = ?job.timeout,
        operation = %job.operation.describe(),
        "invoking operation"
    );

    match timeout(job.timeout, job.operation.invoke(job.input.clone())).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) => Err(PipelineError::TaskExecutionFailed {
            task: job.name.clone(),
            message: format!("{e:#}"),
        }),
        Err(_elapsed) => Err(PipelineError::TimeoutExceeded {
            task: job.name.clone(),
            timeout: job.timeout,
        }),
    }
}

async fn finish(
    events: &mpsc::Sender<WorkerEvent>,
    job: &TaskJob,
    attempt: u32,
    outcome: TaskOutcome,
    will_retry: bool,
) {
    let event = WorkerEvent::AttemptFinished {
        task: job.name.clone(),
        attempt,
        outcome,
        at: Utc::now(),
        will_retry,
    };
    emit(events, event).await;
}

/// Send an event to the executor loop. Returns `false` if the loop is gone.
async fn emit(events: &mpsc::Sender<WorkerEvent>, event: WorkerEvent) -> bool {
    if events.send(event).await.is_err() {
        debug!("executor loop dropped its receiver; stopping worker");
        return false;
    }
    true
}

// src/engine/executor.rs

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use serde_json::Map;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::dag::{Decision, RunScheduler};
use crate::engine::{TaskOutcome, WorkerEvent};
use crate::errors::{PipelineError, Result};
use crate::exec::{TaskJob, run_task};
use crate::pipeline::Pipeline;
use crate::types::{StatusMap, TaskName, TaskStatus, Value};

/// Run IDs only label log lines; they are unique within the process.
static RUN_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Knobs for [`Executor`].
#[derive(Debug, Clone, Copy)]
pub struct ExecutorOptions {
    /// Upper bound on tasks running at the same time. `1` gives strictly
    /// sequential execution in topological order. Values below 1 are
    /// treated as 1.
    pub max_concurrency: usize,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        let max_concurrency = std::thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(1);
        Self { max_concurrency }
    }
}

/// Runs a [`Pipeline`].
///
/// The executor holds only its options. For the duration of a run it
/// borrows the pipeline mutably and is the single writer of every task
/// record: workers report through [`WorkerEvent`]s and this loop applies
/// the transitions.
#[derive(Debug, Clone, Default)]
pub struct Executor {
    options: ExecutorOptions,
}

impl Executor {
    pub fn new(options: ExecutorOptions) -> Self {
        Self { options }
    }

    pub fn with_max_concurrency(max_concurrency: usize) -> Self {
        Self::new(ExecutorOptions { max_concurrency })
    }

    pub fn options(&self) -> ExecutorOptions {
        self.options
    }

    /// Validate and run every task once. See [`run_with_cancel`].
    ///
    /// [`run_with_cancel`]: Executor::run_with_cancel
    pub async fn run(&self, pipeline: &mut Pipeline) -> Result<StatusMap> {
        self.run_with_cancel(pipeline, CancellationToken::new()).await
    }

    /// Validate and run every task once.
    ///
    /// Structural problems (and tasks left terminal by an earlier run) fail
    /// the call before anything executes. Past that point the call always
    /// returns the full status map: a failed task only skips its transitive
    /// dependents, independent branches keep going.
    ///
    /// Cancelling `cancel` skips every task that has not started; running
    /// tasks finish their current attempt without retrying.
    pub async fn run_with_cancel(
        &self,
        pipeline: &mut Pipeline,
        cancel: CancellationToken,
    ) -> Result<StatusMap> {
        pipeline.validate()?;
        pipeline.ensure_runnable()?;

        let mut scheduler = RunScheduler::from_graph(pipeline.graph())?;
        let run_id = RUN_COUNTER.fetch_add(1, Ordering::Relaxed) + 1;
        let capacity = self.options.max_concurrency.max(1);

        info!(
            pipeline = %pipeline.name(),
            run_id,
            tasks = scheduler.order().len(),
            max_concurrency = capacity,
            "starting pipeline run"
        );

        let (tx, mut rx) = mpsc::channel::<WorkerEvent>(64);
        let mut workers: JoinSet<()> = JoinSet::new();
        let mut worker_names: HashMap<tokio::task::Id, TaskName> = HashMap::new();
        let mut cancel_applied = false;

        loop {
            if cancel.is_cancelled() && !cancel_applied {
                cancel_applied = true;
                for name in scheduler.cancel() {
                    pipeline.task_mut(&name)?.skip()?;
                    info!(task = %name, run_id, "skipped: run cancelled");
                }
            }

            let free = capacity.saturating_sub(scheduler.in_flight());
            for decision in scheduler.poll(free) {
                match decision {
                    Decision::Skip { task, blocked_by } => {
                        pipeline.task_mut(&task)?.skip()?;
                        info!(
                            task = %task,
                            blocked_by = %blocked_by,
                            run_id,
                            "skipped: prerequisite did not complete"
                        );
                    }
                    Decision::Dispatch(task) => {
                        let job = prepare_job(pipeline, &task, run_id)?;
                        debug!(task = %task, run_id, "dispatching task");
                        let handle = workers.spawn(run_task(job, tx.clone(), cancel.clone()));
                        worker_names.insert(handle.id(), task);
                    }
                }
            }

            if scheduler.is_finished() {
                break;
            }

            tokio::select! {
                Some(event) = rx.recv() => {
                    apply_event(pipeline, &mut scheduler, event, run_id)?;
                }
                Some(joined) = workers.join_next_with_id() => {
                    match joined {
                        Ok((id, ())) => {
                            worker_names.remove(&id);
                        }
                        Err(join_err) => {
                            let Some(task) = worker_names.remove(&join_err.id()) else {
                                continue;
                            };
                            error!(task = %task, run_id, error = %join_err, "worker crashed");
                            fail_crashed(pipeline, &mut scheduler, &task, join_err.to_string())?;
                        }
                    }
                }
                _ = cancel.cancelled(), if !cancel_applied => {}
            }
        }

        // Every task is terminal; remaining workers have already sent their
        // last event and are just winding down.
        while workers.join_next().await.is_some() {}

        let statuses = pipeline.status_map();
        let completed = statuses
            .values()
            .filter(|s| **s == TaskStatus::Completed)
            .count();
        let failed = statuses
            .values()
            .filter(|s| **s == TaskStatus::Failed)
            .count();
        let skipped = statuses
            .values()
            .filter(|s| **s == TaskStatus::Skipped)
            .count();

        info!(
            pipeline = %pipeline.name(),
            run_id,
            completed,
            failed,
            skipped,
            "pipeline run finished"
        );

        Ok(statuses)
    }
}

/// Snapshot what the worker needs: operation, hooks, input built from the
/// prerequisites' outputs.
fn prepare_job(pipeline: &Pipeline, name: &str, run_id: u64) -> Result<TaskJob> {
    let task = pipeline
        .task(name)
        .ok_or_else(|| PipelineError::TaskNotFound(name.to_string()))?;

    let input = if task.dependencies().is_empty() {
        None
    } else {
        let mut upstream = Map::new();
        for dep in task.dependencies() {
            let output = pipeline.output_of(dep).cloned().unwrap_or(Value::Null);
            upstream.insert(dep.clone(), output);
        }
        Some(Value::Object(upstream))
    };

    Ok(TaskJob {
        name: name.to_string(),
        operation: task.operation(),
        input,
        retries: task.retries(),
        timeout: task.timeout(),
        retry_delay: task.retry_delay(),
        validation: pipeline.hooks().validation_for(name),
        transformation: pipeline.hooks().transformation_for(name),
        run_id,
    })
}

fn apply_event(
    pipeline: &mut Pipeline,
    scheduler: &mut RunScheduler,
    event: WorkerEvent,
    run_id: u64,
) -> Result<()> {
    match event {
        WorkerEvent::AttemptStarted { task, attempt, at } => {
            if !scheduler.is_running(&task) {
                debug!(task = %task, attempt, "late attempt start ignored");
                return Ok(());
            }
            let record = pipeline.task_mut(&task)?;
            if record.status() == TaskStatus::Failed {
                record.rearm()?;
            }
            record.begin(at)?;
            info!(task = %task, run_id, attempt, "task attempt started");
        }
        WorkerEvent::AttemptFinished {
            task,
            attempt,
            outcome,
            at,
            will_retry,
        } => {
            if !scheduler.is_running(&task) {
                debug!(task = %task, attempt, "late attempt result ignored");
                return Ok(());
            }
            let record = pipeline.task_mut(&task)?;
            match outcome {
                TaskOutcome::Success(output) => {
                    record.complete(output, at)?;
                    scheduler.finish(&task, TaskStatus::Completed);
                    info!(task = %task, run_id, attempt, "task completed");
                }
                TaskOutcome::Failed(err) => {
                    record.fail(err.to_string(), at)?;
                    if will_retry {
                        debug!(task = %task, run_id, attempt, "attempt failed; awaiting retry");
                    } else {
                        scheduler.finish(&task, TaskStatus::Failed);
                        warn!(task = %task, run_id, attempt, error = %err, "task failed; skipping dependents");
                    }
                }
            }
        }
    }
    Ok(())
}

/// A worker died without reporting a final outcome (panic in an async
/// operation). Settle its task as failed so the run can finish.
fn fail_crashed(
    pipeline: &mut Pipeline,
    scheduler: &mut RunScheduler,
    task: &str,
    reason: String,
) -> Result<()> {
    if !scheduler.is_running(task) {
        return Ok(());
    }

    let record = pipeline.task_mut(task)?;
    let now = Utc::now();
    match record.status() {
        TaskStatus::Pending => {
            record.begin(now)?;
            record.fail(format!("worker crashed: {reason}"), now)?;
        }
        TaskStatus::Running => {
            record.fail(format!("worker crashed: {reason}"), now)?;
        }
        // Crashed on a retry before its start event was applied.
        TaskStatus::Failed => {
            record.rearm()?;
            record.begin(now)?;
            record.fail(format!("worker crashed: {reason}"), now)?;
        }
        _ => {}
    }
    scheduler.finish(task, TaskStatus::Failed);
    Ok(())
}

// src/pipeline/task.rs

//! Task records: static definition plus per-run lifecycle state.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::errors::{PipelineError, Result};
use crate::exec::Operation;
use crate::types::{TaskName, TaskStatus, Value};

/// Retries granted to a task unless configured otherwise.
pub const DEFAULT_RETRIES: u32 = 3;

/// Per-attempt timeout unless configured otherwise.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3600);

/// A named unit of work inside a [`Pipeline`](crate::pipeline::Pipeline).
pub struct Task {
    name: TaskName,
    operation: Arc<dyn Operation>,
    deps: Vec<TaskName>,
    retries: u32,
    timeout: Duration,
    retry_delay: Duration,

    status: TaskStatus,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    error: Option<String>,
    attempts: u32,
    output: Option<Value>,
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("deps", &self.deps)
            .field("retries", &self.retries)
            .field("timeout", &self.timeout)
            .field("status", &self.status)
            .field("attempts", &self.attempts)
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

impl Task {
    /// Start building a task with default retry budget and timeout.
    pub fn builder(name: impl Into<TaskName>, operation: Arc<dyn Operation>) -> TaskBuilder {
        TaskBuilder {
            name: name.into(),
            operation,
            deps: Vec::new(),
            retries: DEFAULT_RETRIES,
            timeout: DEFAULT_TIMEOUT,
            retry_delay: Duration::ZERO,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared prerequisites, in declaration order.
    pub fn dependencies(&self) -> &[TaskName] {
        &self.deps
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Attempts made during the current (or last) run.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Output of the last successful run, after any transformation hook.
    pub fn output(&self) -> Option<&Value> {
        self.output.as_ref()
    }

    pub(crate) fn operation(&self) -> Arc<dyn Operation> {
        Arc::clone(&self.operation)
    }

    /// `Pending -> Running`.
    pub(crate) fn begin(&mut self, at: DateTime<Utc>) -> Result<()> {
        self.transition(TaskStatus::Pending, TaskStatus::Running)?;
        self.started_at = Some(at);
        self.finished_at = None;
        self.attempts += 1;
        Ok(())
    }

    /// `Running -> Completed`.
    pub(crate) fn complete(&mut self, output: Value, at: DateTime<Utc>) -> Result<()> {
        self.transition(TaskStatus::Running, TaskStatus::Completed)?;
        self.finished_at = Some(at);
        self.error = None;
        self.output = Some(output);
        Ok(())
    }

    /// `Running -> Failed`.
    pub(crate) fn fail(&mut self, error: String, at: DateTime<Utc>) -> Result<()> {
        self.transition(TaskStatus::Running, TaskStatus::Failed)?;
        self.finished_at = Some(at);
        self.error = Some(error);
        Ok(())
    }

    /// `Pending -> Skipped`.
    pub(crate) fn skip(&mut self) -> Result<()> {
        self.transition(TaskStatus::Pending, TaskStatus::Skipped)
    }

    /// `Failed -> Pending` between two attempts of the same run.
    ///
    /// Timestamps are cleared so the next attempt records fresh ones; the
    /// previous error stays visible until that attempt ends.
    pub(crate) fn rearm(&mut self) -> Result<()> {
        self.transition(TaskStatus::Failed, TaskStatus::Pending)?;
        self.started_at = None;
        self.finished_at = None;
        Ok(())
    }

    /// Any state -> `Pending`, dropping everything recorded by earlier runs.
    pub(crate) fn reset(&mut self) {
        self.status = TaskStatus::Pending;
        self.started_at = None;
        self.finished_at = None;
        self.error = None;
        self.attempts = 0;
        self.output = None;
    }

    fn transition(&mut self, from: TaskStatus, to: TaskStatus) -> Result<()> {
        if self.status != from {
            return Err(PipelineError::InvalidStateTransition {
                task: self.name.clone(),
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }
}

/// Builder returned by [`Task::builder`].
pub struct TaskBuilder {
    name: TaskName,
    operation: Arc<dyn Operation>,
    deps: Vec<TaskName>,
    retries: u32,
    timeout: Duration,
    retry_delay: Duration,
}

impl TaskBuilder {
    /// Declare a prerequisite. Order of calls is preserved.
    pub fn after(mut self, dep: impl Into<TaskName>) -> Self {
        self.deps.push(dep.into());
        self
    }

    /// Retries after the first failed attempt (0 = run once).
    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Upper bound for a single attempt.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Pause between a failed attempt and the next one.
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn build(self) -> Task {
        Task {
            name: self.name,
            operation: self.operation,
            deps: self.deps,
            retries: self.retries,
            timeout: self.timeout,
            retry_delay: self.retry_delay,
            status: TaskStatus::Pending,
            started_at: None,
            finished_at: None,
            error: None,
            attempts: 0,
            output: None,
        }
    }
}

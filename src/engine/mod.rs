// src/engine/mod.rs

//! Run orchestration.
//!
//! The synchronous readiness logic lives in [`crate::dag::scheduler`]; this
//! module is the async shell around it:
//! - [`executor`] validates a pipeline, dispatches tasks to a bounded pool of
//!   workers and applies their lifecycle events to the task records
//! - workers (see [`crate::exec::task_runner`]) report back through
//!   [`WorkerEvent`]s

use chrono::{DateTime, Utc};

use crate::errors::PipelineError;
use crate::types::{TaskName, Value};

pub mod executor;

pub use executor::{Executor, ExecutorOptions};

/// Outcome of one attempt.
#[derive(Debug)]
pub enum TaskOutcome {
    /// The operation (and transformation hook, if any) succeeded.
    Success(Value),
    /// Validation, operation, timeout or transformation failure.
    Failed(PipelineError),
}

/// Events flowing from workers into the executor loop.
///
/// The loop is the only place task records are mutated, so the order in
/// which these arrive is the order transitions happen.
#[derive(Debug)]
pub enum WorkerEvent {
    /// An attempt is starting (`Pending -> Running`).
    AttemptStarted {
        task: TaskName,
        attempt: u32,
        at: DateTime<Utc>,
    },
    /// An attempt ended. With `will_retry` the failure is not final and
    /// another `AttemptStarted` follows.
    AttemptFinished {
        task: TaskName,
        attempt: u32,
        outcome: TaskOutcome,
        at: DateTime<Utc>,
        will_retry: bool,
    },
}

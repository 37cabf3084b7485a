// src/exec/mod.rs

//! Execution layer.
//!
//! - [`operation`] defines the [`Operation`] capability every task invokes,
//!   plus closure-backed implementations.
//! - [`command`] provides [`CommandOperation`], which runs a shell command
//!   with `tokio::process::Command`.
//! - [`task_runner`] drives one task through validation, timed attempts,
//!   retries and transformation, reporting to the executor loop.

pub mod command;
pub mod operation;
pub mod task_runner;

pub use command::CommandOperation;
pub use operation::{AsyncFnOperation, FnOperation, Operation, OperationFuture, async_operation, operation_fn};
pub use task_runner::{TaskJob, run_task};

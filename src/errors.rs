// src/errors.rs

//! Crate-wide error type.
//!
//! Structural errors (`DuplicateTaskName`, `UnknownDependency`,
//! `CycleDetected`, `MissingConnectionDescriptor`) are returned from the
//! add/validate call that triggered them. Execution-time errors are recorded
//! on the task as a status plus error string; the variants exist so the text
//! stored on a task is always produced the same way.

use std::time::Duration;

use thiserror::Error;

use crate::types::{TaskName, TaskStatus};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Duplicate task name: {0}")]
    DuplicateTaskName(TaskName),

    #[error("task '{task}' has unknown dependency '{dependency}'")]
    UnknownDependency { task: TaskName, dependency: TaskName },

    #[error("Cycle detected in DAG: {0}")]
    CycleDetected(String),

    #[error("{kind} '{name}' missing connection descriptor")]
    MissingConnectionDescriptor { kind: &'static str, name: String },

    #[error("Validation failed for task '{task}': {message}")]
    ValidationFailed { task: TaskName, message: String },

    #[error("Transformation failed for task '{task}': {message}")]
    TransformationFailed { task: TaskName, message: String },

    #[error("Task '{task}' failed: {message}")]
    TaskExecutionFailed { task: TaskName, message: String },

    #[error("Task '{task}' exceeded its timeout of {timeout:?}")]
    TimeoutExceeded { task: TaskName, timeout: Duration },

    #[error("Invalid state transition for task '{task}': {from} -> {to}")]
    InvalidStateTransition {
        task: TaskName,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error("Task not found: {0}")]
    TaskNotFound(TaskName),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

// src/dag/mod.rs

//! DAG representation and per-run scheduling.
//!
//! - [`graph`] holds the dependency graph of task names and enforces
//!   acyclicity on every mutation.
//! - [`scheduler`] contains the per-run state machine that decides which
//!   tasks are ready, which are skipped, and when a run is over.

pub mod graph;
pub mod scheduler;

pub use graph::DependencyGraph;
pub use scheduler::{Decision, RunScheduler, RunState};

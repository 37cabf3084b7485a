// src/lib.rs

//! Dependency-ordered task pipelines.
//!
//! A [`Pipeline`] owns named tasks, the [`DependencyGraph`] between them,
//! optional validation/transformation hooks and source/target descriptors.
//! The [`Executor`] runs it: prerequisites first, bounded concurrency,
//! per-attempt timeouts, retries, and skip propagation down failed branches.

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod pipeline;
pub mod types;

use std::path::PathBuf;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub use crate::dag::DependencyGraph;
pub use crate::engine::{Executor, ExecutorOptions, TaskOutcome};
pub use crate::errors::PipelineError;
pub use crate::exec::{CommandOperation, Operation, async_operation, operation_fn};
pub use crate::pipeline::{Endpoint, Pipeline, Source, Target, Task};
pub use crate::types::{StatusMap, TaskName, TaskStatus, Value};

use crate::cli::CliArgs;
use crate::config::loader::load_pipeline;
use crate::config::model::PipelineFile;

/// High-level entry point used by `main.rs`. Returns the process exit code:
/// `0` when every task completed, `1` otherwise.
pub async fn run(args: CliArgs) -> Result<i32> {
    let config_path = PathBuf::from(&args.config);
    let (file, mut pipeline) = load_pipeline(&config_path)
        .with_context(|| format!("loading pipeline from {}", config_path.display()))?;

    pipeline.validate()?;

    if args.dry_run {
        print_dry_run(&file, &pipeline)?;
        return Ok(0);
    }

    let mut options = ExecutorOptions::default();
    if let Some(n) = file.pipeline.max_concurrency {
        options.max_concurrency = n;
    }
    if let Some(n) = args.max_concurrency {
        options.max_concurrency = usize::try_from(n).unwrap_or(usize::MAX);
    }
    let executor = Executor::new(options);

    // Ctrl-C cancels the run: pending tasks are skipped, running ones finish.
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl+C");
                return;
            }
            info!("Ctrl+C received; cancelling run");
            cancel.cancel();
        });
    }

    let statuses = pipeline.run_with(&executor, cancel).await?;
    print_status_table(&pipeline, &statuses)?;

    let all_completed = statuses.values().all(|s| *s == TaskStatus::Completed);
    Ok(if all_completed { 0 } else { 1 })
}

/// Final per-task report, in execution order.
fn print_status_table(pipeline: &Pipeline, statuses: &StatusMap) -> Result<()> {
    let order = pipeline.execution_order()?;
    let width = order.iter().map(String::len).max().unwrap_or(4).max(4);

    println!("{:<width$}  {:<9}  {:>8}  ERROR", "TASK", "STATUS", "ATTEMPTS");
    for name in &order {
        let status = statuses.get(name).copied().unwrap_or_default();
        let (attempts, error) = pipeline
            .task(name)
            .map(|t| (t.attempts(), t.error().unwrap_or("")))
            .unwrap_or((0, ""));
        println!("{name:<width$}  {:<9}  {attempts:>8}  {error}", status.to_string());
    }
    Ok(())
}

fn print_dry_run(file: &PipelineFile, pipeline: &Pipeline) -> Result<()> {
    println!("pipedag dry-run: pipeline '{}'", pipeline.name());
    match file.pipeline.max_concurrency {
        Some(n) => println!("  max_concurrency = {n}"),
        None => println!("  max_concurrency = (default)"),
    }
    println!();

    let sources: Vec<&Source> = pipeline.sources().collect();
    if !sources.is_empty() {
        println!("sources ({}):", sources.len());
        for s in sources {
            println!("  - {} [{}] {}", s.name, s.kind, s.connection);
        }
    }
    let targets: Vec<&Target> = pipeline.targets().collect();
    if !targets.is_empty() {
        println!("targets ({}):", targets.len());
        for t in targets {
            println!("  - {} [{}] {}", t.name, t.kind, t.connection);
        }
    }

    println!("tasks ({}):", file.task.len());
    for (name, task) in &file.task {
        println!("  - {name}");
        println!("      cmd: {}", task.cmd);
        if !task.after.is_empty() {
            println!("      after: {:?}", task.after);
        }
        if let Some(retries) = task.retries {
            println!("      retries: {retries}");
        }
        if let Some(ref timeout) = task.timeout {
            println!("      timeout: {timeout}");
        }
        if let Some(ref delay) = task.retry_delay {
            println!("      retry_delay: {delay}");
        }
    }
    println!();

    let order = pipeline.execution_order()?;
    println!("execution order: {}", order.join(" -> "));

    debug!("dry-run complete (no execution)");
    Ok(())
}

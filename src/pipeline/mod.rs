// src/pipeline/mod.rs

//! The pipeline: tasks, their dependency graph, hooks and endpoints.

pub mod endpoint;
pub mod hooks;
pub mod task;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::dag::DependencyGraph;
use crate::engine::Executor;
use crate::errors::{PipelineError, Result};
use crate::types::{StatusMap, TaskName, TaskStatus, Value};

pub use endpoint::{Endpoint, Source, Target};
pub use hooks::{HookRegistry, TransformationHook, ValidationHook};
pub use task::{DEFAULT_RETRIES, DEFAULT_TIMEOUT, Task, TaskBuilder};

/// A named set of tasks plus everything needed to run them.
///
/// The pipeline exclusively owns its graph, task records, hooks and
/// endpoint descriptors. It can be run any number of times; between runs
/// call [`reset`](Pipeline::reset).
#[derive(Debug)]
pub struct Pipeline {
    name: String,
    graph: DependencyGraph,
    tasks: HashMap<TaskName, Task>,
    hooks: HookRegistry,
    sources: BTreeMap<String, Source>,
    targets: BTreeMap<String, Target>,
}

impl Pipeline {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            graph: DependencyGraph::new(),
            tasks: HashMap::new(),
            hooks: HookRegistry::new(),
            sources: BTreeMap::new(),
            targets: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register a data source. A source with the same name is replaced.
    pub fn add_source(&mut self, source: Source) {
        debug!(pipeline = %self.name, source = %source.name, kind = %source.kind, "adding source");
        if let Some(old) = self.sources.insert(source.name.clone(), source) {
            warn!(pipeline = %self.name, source = %old.name, "replaced existing source");
        }
    }

    /// Register a data target. A target with the same name is replaced.
    pub fn add_target(&mut self, target: Target) {
        debug!(pipeline = %self.name, target = %target.name, kind = %target.kind, "adding target");
        if let Some(old) = self.targets.insert(target.name.clone(), target) {
            warn!(pipeline = %self.name, target = %old.name, "replaced existing target");
        }
    }

    /// Add a task whose prerequisites are already part of the pipeline.
    ///
    /// Fails with `DuplicateTaskName`, `UnknownDependency` or
    /// `CycleDetected`; on failure the pipeline is left untouched.
    pub fn add_task(&mut self, task: Task) -> Result<()> {
        if self.tasks.contains_key(task.name()) {
            return Err(PipelineError::DuplicateTaskName(task.name().to_string()));
        }

        self.graph
            .add_task_with_dependencies(task.name(), task.dependencies())?;

        debug!(
            pipeline = %self.name,
            task = %task.name(),
            deps = ?task.dependencies(),
            retries = task.retries(),
            timeout = ?task.timeout(),
            "task added"
        );
        self.tasks.insert(task.name().to_string(), task);
        Ok(())
    }

    /// Run `hook` before `task`'s operation. It receives the task's input.
    pub fn add_validation_hook<F>(&mut self, task: impl Into<TaskName>, hook: F)
    where
        F: Fn(Option<&Value>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.hooks.register_validation(task, Arc::new(hook));
    }

    /// Run `hook` on `task`'s output after a successful operation. The hook's
    /// return value replaces the output that dependents receive.
    pub fn add_transformation_hook<F>(&mut self, task: impl Into<TaskName>, hook: F)
    where
        F: Fn(Value) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.hooks.register_transformation(task, Arc::new(hook));
    }

    /// Structural validation, performed again at the start of every run.
    ///
    /// Checks, in order: acyclicity, that every declared dependency names an
    /// existing task, and that every source and target has a non-empty
    /// connection descriptor.
    pub fn validate(&self) -> Result<()> {
        if !self.graph.is_acyclic() {
            return Err(PipelineError::CycleDetected(format!(
                "pipeline '{}' contains circular dependencies",
                self.name
            )));
        }

        for name in self.graph.tasks() {
            let Some(task) = self.tasks.get(name) else {
                continue;
            };
            for dep in task.dependencies() {
                if !self.tasks.contains_key(dep) {
                    return Err(PipelineError::UnknownDependency {
                        task: name.to_string(),
                        dependency: dep.clone(),
                    });
                }
            }
        }

        for source in self.sources.values() {
            source.ensure_connection("Source")?;
        }
        for target in self.targets.values() {
            target.ensure_connection("Target")?;
        }

        for hooked in self.hooks.hooked_tasks() {
            if !self.tasks.contains_key(hooked) {
                warn!(pipeline = %self.name, task = %hooked, "hook registered for unknown task; it will never run");
            }
        }

        Ok(())
    }

    /// Run every task once with a default [`Executor`].
    pub async fn run(&mut self) -> Result<StatusMap> {
        Executor::default().run(self).await
    }

    /// Run with an explicit executor and a caller-owned cancellation token.
    pub async fn run_with(
        &mut self,
        executor: &Executor,
        cancel: CancellationToken,
    ) -> Result<StatusMap> {
        executor.run_with_cancel(self, cancel).await
    }

    pub fn get_task_status(&self, name: &str) -> Result<TaskStatus> {
        self.tasks
            .get(name)
            .map(Task::status)
            .ok_or_else(|| PipelineError::TaskNotFound(name.to_string()))
    }

    /// Return every task to `Pending`, clearing timestamps, errors, outputs
    /// and attempt counts. Graph, hooks and endpoints are kept.
    pub fn reset(&mut self) {
        for task in self.tasks.values_mut() {
            task.reset();
        }
        info!(pipeline = %self.name, tasks = self.tasks.len(), "pipeline reset");
    }

    pub fn task(&self, name: &str) -> Option<&Task> {
        self.tasks.get(name)
    }

    /// Output recorded by `name`'s last successful run.
    pub fn output_of(&self, name: &str) -> Option<&Value> {
        self.tasks.get(name).and_then(Task::output)
    }

    /// Task names in the order they were added.
    pub fn task_names(&self) -> impl Iterator<Item = &str> {
        self.graph.tasks()
    }

    /// The order a sequential run would follow.
    pub fn execution_order(&self) -> Result<Vec<TaskName>> {
        self.graph.topological_order()
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn sources(&self) -> impl Iterator<Item = &Source> {
        self.sources.values()
    }

    pub fn targets(&self) -> impl Iterator<Item = &Target> {
        self.targets.values()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Current status of every task.
    pub fn status_map(&self) -> StatusMap {
        self.tasks
            .iter()
            .map(|(name, task)| (name.clone(), task.status()))
            .collect()
    }

    pub(crate) fn task_mut(&mut self, name: &str) -> Result<&mut Task> {
        self.tasks
            .get_mut(name)
            .ok_or_else(|| PipelineError::TaskNotFound(name.to_string()))
    }

    pub(crate) fn hooks(&self) -> &HookRegistry {
        &self.hooks
    }

    /// Every task must start a run in `Pending`; a terminal task means the
    /// caller forgot to [`reset`](Pipeline::reset).
    pub(crate) fn ensure_runnable(&self) -> Result<()> {
        for name in self.graph.tasks() {
            if let Some(task) = self.tasks.get(name) {
                if task.status() != TaskStatus::Pending {
                    return Err(PipelineError::InvalidStateTransition {
                        task: name.to_string(),
                        from: task.status(),
                        to: TaskStatus::Running,
                    });
                }
            }
        }
        Ok(())
    }
}

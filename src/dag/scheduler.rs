// src/dag/scheduler.rs

use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::dag::graph::DependencyGraph;
use crate::errors::Result;
use crate::types::{TaskName, TaskStatus};

/// Per-run state of a task inside the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Not yet decided: some prerequisite is still running or waiting.
    Waiting,
    /// Handed to a worker; waiting for its final outcome.
    Running,
    /// Terminal for this run.
    Done(TaskStatus),
}

/// What the executor should do with a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Every prerequisite completed; start the task.
    Dispatch(TaskName),
    /// A prerequisite ended without completing; the task must not run.
    Skip { task: TaskName, blocked_by: TaskName },
}

/// Synchronous, IO-free readiness tracker for one run.
///
/// It decides:
/// - which tasks are eligible (every prerequisite terminal)
/// - whether an eligible task runs or resolves straight to `Skipped`
/// - when the run is finished
///
/// Tasks are always considered in topological order, so with a capacity of
/// one the dispatch sequence *is* the topological order, and a skip
/// cascades through all transitive dependents within a single [`poll`].
///
/// [`poll`]: RunScheduler::poll
#[derive(Debug)]
pub struct RunScheduler {
    order: Vec<TaskName>,
    deps: HashMap<TaskName, Vec<TaskName>>,
    states: HashMap<TaskName, RunState>,
    running: usize,
    cancelled: bool,
}

impl RunScheduler {
    /// Build a scheduler for every task in `graph`, all `Waiting`.
    pub fn from_graph(graph: &DependencyGraph) -> Result<Self> {
        let order = graph.topological_order()?;
        let deps = order
            .iter()
            .map(|name| (name.clone(), graph.dependencies_of(name)))
            .collect();
        let states = order
            .iter()
            .map(|name| (name.clone(), RunState::Waiting))
            .collect();

        debug!(?order, "scheduler: computed execution order");

        Ok(Self {
            order,
            deps,
            states,
            running: 0,
            cancelled: false,
        })
    }

    /// The topological order this run follows.
    pub fn order(&self) -> &[TaskName] {
        &self.order
    }

    pub fn state_of(&self, task: &str) -> Option<RunState> {
        self.states.get(task).copied()
    }

    pub fn is_running(&self, task: &str) -> bool {
        matches!(self.states.get(task), Some(RunState::Running))
    }

    /// Number of tasks currently handed to workers.
    pub fn in_flight(&self) -> usize {
        self.running
    }

    /// No task is waiting or running.
    pub fn is_finished(&self) -> bool {
        self.running == 0
            && !self
                .states
                .values()
                .any(|s| matches!(s, RunState::Waiting))
    }

    /// Resolve every task that can be decided right now.
    ///
    /// At most `capacity` tasks are dispatched; skips are not limited. Tasks
    /// returned as `Dispatch` are marked `Running`, tasks returned as `Skip`
    /// are terminal immediately.
    pub fn poll(&mut self, capacity: usize) -> Vec<Decision> {
        let mut decisions = Vec::new();
        let mut dispatched = 0;

        for name in &self.order {
            if !matches!(self.states.get(name), Some(RunState::Waiting)) {
                continue;
            }

            let mut all_terminal = true;
            let mut blocked_by: Option<&TaskName> = None;
            for dep in self.deps.get(name).into_iter().flatten() {
                match self.states.get(dep) {
                    Some(RunState::Done(TaskStatus::Completed)) => {}
                    Some(RunState::Done(_)) => {
                        blocked_by.get_or_insert(dep);
                    }
                    Some(RunState::Waiting) | Some(RunState::Running) => {
                        all_terminal = false;
                    }
                    None => {
                        warn!(task = %name, dep = %dep, "dependency missing from run state");
                        blocked_by.get_or_insert(dep);
                    }
                }
            }

            if let Some(dep) = blocked_by {
                // One failed/skipped prerequisite settles it; no need to wait
                // for the rest.
                decisions.push(Decision::Skip {
                    task: name.clone(),
                    blocked_by: dep.clone(),
                });
                self.states
                    .insert(name.clone(), RunState::Done(TaskStatus::Skipped));
                continue;
            }

            if !all_terminal || self.cancelled || dispatched >= capacity {
                continue;
            }

            self.states.insert(name.clone(), RunState::Running);
            self.running += 1;
            dispatched += 1;
            decisions.push(Decision::Dispatch(name.clone()));
        }

        decisions
    }

    /// Record the final outcome of a dispatched task.
    pub fn finish(&mut self, task: &str, status: TaskStatus) {
        match self.states.get_mut(task) {
            Some(state @ RunState::Running) => {
                *state = RunState::Done(status);
                self.running -= 1;
                debug!(task = %task, %status, "scheduler: task finished");
            }
            Some(other) => {
                warn!(task = %task, state = ?other, "finish for task that is not running; ignoring");
            }
            None => {
                warn!(task = %task, "finish for unknown task; ignoring");
            }
        }
    }

    /// Stop dispatching. Every task still waiting becomes `Skipped`; the
    /// returned names are the tasks that were skipped by this call.
    pub fn cancel(&mut self) -> Vec<TaskName> {
        self.cancelled = true;

        let skipped: Vec<TaskName> = self
            .order
            .iter()
            .filter(|name| matches!(self.states.get(*name), Some(RunState::Waiting)))
            .cloned()
            .collect();

        for name in &skipped {
            self.states
                .insert(name.clone(), RunState::Done(TaskStatus::Skipped));
        }

        info!(
            skipped = skipped.len(),
            in_flight = self.running,
            "scheduler: run cancelled"
        );
        skipped
    }
}

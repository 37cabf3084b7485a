// src/pipeline/hooks.rs

//! Per-task validation and transformation hooks.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;

use crate::types::{TaskName, Value};

/// Check run before a task's operation. Receives the same input the
/// operation would; an error blocks the task.
pub type ValidationHook = Arc<dyn Fn(Option<&Value>) -> anyhow::Result<()> + Send + Sync>;

/// Runs on a task's actual output after a successful operation. The returned
/// value becomes the task's recorded output.
pub type TransformationHook = Arc<dyn Fn(Value) -> anyhow::Result<Value> + Send + Sync>;

/// Two registries keyed by task name, at most one hook per name in each.
#[derive(Default, Clone)]
pub struct HookRegistry {
    validations: HashMap<TaskName, ValidationHook>,
    transformations: HashMap<TaskName, TransformationHook>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a validation hook, replacing any previous one for `task`.
    pub fn register_validation(&mut self, task: impl Into<TaskName>, hook: ValidationHook) {
        let task = task.into();
        if self.validations.insert(task.clone(), hook).is_some() {
            warn!(task = %task, "replacing existing validation hook");
        }
    }

    /// Register a transformation hook, replacing any previous one for `task`.
    pub fn register_transformation(
        &mut self,
        task: impl Into<TaskName>,
        hook: TransformationHook,
    ) {
        let task = task.into();
        if self.transformations.insert(task.clone(), hook).is_some() {
            warn!(task = %task, "replacing existing transformation hook");
        }
    }

    pub fn validation_for(&self, task: &str) -> Option<ValidationHook> {
        self.validations.get(task).cloned()
    }

    pub fn transformation_for(&self, task: &str) -> Option<TransformationHook> {
        self.transformations.get(task).cloned()
    }

    /// Task names with at least one hook, for diagnostics.
    pub fn hooked_tasks(&self) -> impl Iterator<Item = &str> {
        self.validations
            .keys()
            .chain(self.transformations.keys().filter(|k| !self.validations.contains_key(*k)))
            .map(|s| s.as_str())
    }
}

impl std::fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookRegistry")
            .field("validations", &self.validations.keys().collect::<Vec<_>>())
            .field(
                "transformations",
                &self.transformations.keys().collect::<Vec<_>>(),
            )
            .finish()
    }
}

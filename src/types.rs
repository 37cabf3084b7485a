use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

/// Canonical task name type used throughout the crate.
pub type TaskName = String;

/// Data flowing between operations. Opaque to the executor.
pub type Value = serde_json::Value;

/// Final status of every task after a run, keyed by task name.
pub type StatusMap = BTreeMap<TaskName, TaskStatus>;

/// Lifecycle state of a task.
///
/// ```text
/// Pending -> Running -> Completed
///                    -> Failed -> (retry) Pending
/// Pending -> Skipped
/// any     -> Pending  (reset)
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl TaskStatus {
    /// `Completed`, `Failed` and `Skipped` are terminal for a run.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Skipped
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::Running => "RUNNING",
            TaskStatus::Completed => "COMPLETED",
            TaskStatus::Failed => "FAILED",
            TaskStatus::Skipped => "SKIPPED",
        };
        f.write_str(s)
    }
}

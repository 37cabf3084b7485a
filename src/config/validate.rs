// src/config/validate.rs

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::duration::parse_duration;
use crate::config::model::{PipelineFile, RawPipelineFile};
use crate::errors::{PipelineError, Result};

impl TryFrom<RawPipelineFile> for PipelineFile {
    type Error = PipelineError;

    fn try_from(raw: RawPipelineFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_pipeline(&raw)?;
        Ok(PipelineFile::new_unchecked(raw))
    }
}

fn validate_raw_pipeline(cfg: &RawPipelineFile) -> Result<()> {
    ensure_has_tasks(cfg)?;
    validate_pipeline_section(cfg)?;
    validate_task_fields(cfg)?;
    validate_task_dependencies(cfg)?;
    validate_dag(cfg)?;
    Ok(())
}

fn ensure_has_tasks(cfg: &RawPipelineFile) -> Result<()> {
    if cfg.task.is_empty() {
        return Err(PipelineError::Config(
            "pipeline file must contain at least one [task.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_pipeline_section(cfg: &RawPipelineFile) -> Result<()> {
    if cfg.pipeline.name.trim().is_empty() {
        return Err(PipelineError::Config(
            "[pipeline].name must not be empty".to_string(),
        ));
    }
    if cfg.pipeline.max_concurrency == Some(0) {
        return Err(PipelineError::Config(
            "[pipeline].max_concurrency must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_task_fields(cfg: &RawPipelineFile) -> Result<()> {
    for (name, task) in &cfg.task {
        if task.cmd.trim().is_empty() {
            return Err(PipelineError::Config(format!(
                "[task.{name}].cmd must not be empty"
            )));
        }

        let durations = [("timeout", &task.timeout), ("retry_delay", &task.retry_delay)];
        for (field, value) in durations {
            if let Some(raw) = value {
                if parse_duration(raw).is_err() {
                    return Err(PipelineError::Config(format!(
                        "[task.{name}].{field} = \"{raw}\" is not a valid duration (expected e.g. 250ms, 30s, 5m, 1h)"
                    )));
                }
            }
        }
    }
    Ok(())
}

fn validate_task_dependencies(cfg: &RawPipelineFile) -> Result<()> {
    for (name, task) in &cfg.task {
        for dep in &task.after {
            if dep == name {
                return Err(PipelineError::CycleDetected(format!(
                    "task '{name}' depends on itself"
                )));
            }
            if !cfg.task.contains_key(dep) {
                return Err(PipelineError::UnknownDependency {
                    task: name.clone(),
                    dependency: dep.clone(),
                });
            }
        }
    }
    Ok(())
}

fn validate_dag(cfg: &RawPipelineFile) -> Result<()> {
    // Edge direction: dep -> task.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in cfg.task.keys() {
        graph.add_node(name.as_str());
    }
    for (name, task) in &cfg.task {
        for dep in &task.after {
            graph.add_edge(dep.as_str(), name.as_str(), ());
        }
    }

    match toposort(&graph, None) {
        Ok(_) => Ok(()),
        Err(cycle) => Err(PipelineError::CycleDetected(format!(
            "cycle in task definitions involving task '{}'",
            cycle.node_id()
        ))),
    }
}

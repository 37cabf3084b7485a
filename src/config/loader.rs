// src/config/loader.rs

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::config::duration::parse_duration;
use crate::config::model::{EndpointConfig, PipelineFile, RawPipelineFile, TaskConfig};
use crate::errors::{PipelineError, Result};
use crate::exec::CommandOperation;
use crate::pipeline::{Endpoint, Pipeline, Task};

/// Load a pipeline file from `path` and return the raw [`RawPipelineFile`].
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawPipelineFile> {
    let contents = fs::read_to_string(path.as_ref())?;
    let raw: RawPipelineFile = toml::from_str(&contents)?;
    Ok(raw)
}

/// Parse a pipeline definition held in memory.
pub fn parse_str(contents: &str) -> Result<PipelineFile> {
    let raw: RawPipelineFile = toml::from_str(contents)?;
    PipelineFile::try_from(raw)
}

/// Load a pipeline file and run validation: at least one task, sane
/// `[pipeline]` settings, parseable durations, known `after` references and
/// no cycles.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<PipelineFile> {
    let raw = load_from_path(&path)?;
    PipelineFile::try_from(raw)
}

/// Load, validate and build a runnable [`Pipeline`] in one step.
///
/// Relative task `dir` entries resolve against the file's directory.
pub fn load_pipeline(path: impl AsRef<Path>) -> Result<(PipelineFile, Pipeline)> {
    let path = path.as_ref();
    let file = load_and_validate(path)?;
    let pipeline = file.build_pipeline(&config_root_dir(path))?;
    Ok((file, pipeline))
}

/// `Pipedag.toml` in the current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Pipedag.toml")
}

/// Directory containing the pipeline file, or `.`.
pub fn config_root_dir(config_path: &Path) -> PathBuf {
    config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

impl PipelineFile {
    /// Turn the definition into a [`Pipeline`] of [`CommandOperation`] tasks.
    ///
    /// Tasks are added in passes: each pass adds (in name order) every task
    /// whose `after` entries are already present. A pass that adds nothing
    /// means the remaining tasks reference an undefined name or form a cycle.
    pub fn build_pipeline(&self, root_dir: &Path) -> Result<Pipeline> {
        let mut pipeline = Pipeline::new(self.pipeline.name.clone());

        for (name, cfg) in &self.source {
            pipeline.add_source(endpoint_from(name, cfg));
        }
        for (name, cfg) in &self.target {
            pipeline.add_target(endpoint_from(name, cfg));
        }

        let mut remaining: BTreeMap<&str, &TaskConfig> =
            self.task.iter().map(|(k, v)| (k.as_str(), v)).collect();

        while !remaining.is_empty() {
            let ready: Vec<&str> = remaining
                .iter()
                .filter(|(_, cfg)| cfg.after.iter().all(|dep| pipeline.task(dep).is_some()))
                .map(|(name, _)| *name)
                .collect();

            if ready.is_empty() {
                return Err(stalled_error(&self.task, &remaining));
            }

            for name in ready {
                if let Some(cfg) = remaining.remove(name) {
                    pipeline.add_task(task_from(name, cfg, root_dir)?)?;
                }
            }
        }

        debug!(
            pipeline = %pipeline.name(),
            tasks = pipeline.len(),
            "pipeline built from file"
        );
        Ok(pipeline)
    }
}

fn endpoint_from(name: &str, cfg: &EndpointConfig) -> Endpoint {
    let endpoint = Endpoint::new(name, cfg.connection.clone(), cfg.kind.clone());
    match &cfg.schema {
        Some(schema) => endpoint.with_schema(schema.clone()),
        None => endpoint,
    }
}

fn task_from(name: &str, cfg: &TaskConfig, root_dir: &Path) -> Result<Task> {
    let mut op = CommandOperation::new(cfg.cmd.clone()).current_dir(match &cfg.dir {
        Some(dir) => root_dir.join(dir),
        None => root_dir.to_path_buf(),
    });
    for (key, value) in &cfg.env {
        op = op.env(key.clone(), value.clone());
    }

    let mut builder = Task::builder(name, Arc::new(op));
    for dep in &cfg.after {
        builder = builder.after(dep.clone());
    }
    if let Some(retries) = cfg.retries {
        builder = builder.retries(retries);
    }
    if let Some(timeout) = &cfg.timeout {
        builder = builder.timeout(parse_duration(timeout)?);
    }
    if let Some(delay) = &cfg.retry_delay {
        builder = builder.retry_delay(parse_duration(delay)?);
    }
    Ok(builder.build())
}

fn stalled_error(
    all: &BTreeMap<String, TaskConfig>,
    remaining: &BTreeMap<&str, &TaskConfig>,
) -> PipelineError {
    for (name, cfg) in remaining {
        if let Some(dep) = cfg.after.iter().find(|dep| !all.contains_key(*dep)) {
            return PipelineError::UnknownDependency {
                task: name.to_string(),
                dependency: dep.clone(),
            };
        }
    }

    let stuck: Vec<&str> = remaining.keys().copied().collect();
    PipelineError::CycleDetected(format!(
        "tasks [{}] depend on each other",
        stuck.join(", ")
    ))
}

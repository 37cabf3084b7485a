// src/config/model.rs

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::types::Value;

/// Top-level pipeline definition as read from a TOML file.
///
/// ```toml
/// [pipeline]
/// name = "data_processing"
/// max_concurrency = 4
///
/// [source.raw_data]
/// connection = "postgresql://localhost:5432/db"
/// kind = "postgresql"
///
/// [task.ingest]
/// cmd = "cat data.json"
///
/// [task.transform]
/// cmd = "jq '.ingest | length'"
/// after = ["ingest"]
/// timeout = "30s"
/// retries = 1
/// ```
///
/// All sections are optional at parse time; validation requires at least one
/// task.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawPipelineFile {
    /// Global settings from `[pipeline]`.
    #[serde(default)]
    pub pipeline: PipelineSection,

    /// Data sources from `[source.<name>]`.
    #[serde(default)]
    pub source: BTreeMap<String, EndpointConfig>,

    /// Data targets from `[target.<name>]`.
    #[serde(default)]
    pub target: BTreeMap<String, EndpointConfig>,

    /// Tasks from `[task.<name>]`, keyed by task name.
    #[serde(default)]
    pub task: BTreeMap<String, TaskConfig>,
}

/// Validated pipeline definition. Only obtainable through
/// `TryFrom<RawPipelineFile>` (see `config::validate`).
#[derive(Debug, Clone)]
pub struct PipelineFile {
    pub pipeline: PipelineSection,
    pub source: BTreeMap<String, EndpointConfig>,
    pub target: BTreeMap<String, EndpointConfig>,
    pub task: BTreeMap<String, TaskConfig>,
}

impl PipelineFile {
    pub(crate) fn new_unchecked(raw: RawPipelineFile) -> Self {
        Self {
            pipeline: raw.pipeline,
            source: raw.source,
            target: raw.target,
            task: raw.task,
        }
    }
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineSection {
    /// Pipeline name used in logs. Defaults to `"pipeline"`.
    #[serde(default = "default_pipeline_name")]
    pub name: String,

    /// Maximum number of tasks running at once. If unset the executor
    /// default (available CPUs) applies; the CLI flag overrides both.
    #[serde(default)]
    pub max_concurrency: Option<usize>,
}

fn default_pipeline_name() -> String {
    "pipeline".to_string()
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            name: default_pipeline_name(),
            max_concurrency: None,
        }
    }
}

/// `[source.<name>]` / `[target.<name>]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct EndpointConfig {
    /// Opaque connection descriptor; must be non-empty when the pipeline is
    /// validated.
    #[serde(default)]
    pub connection: String,

    /// Free-form type tag, e.g. `"postgresql"` or `"csv"`.
    #[serde(default)]
    pub kind: String,

    /// Optional schema, passed through untouched.
    #[serde(default)]
    pub schema: Option<Value>,
}

/// `[task.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskConfig {
    /// Shell command to execute.
    pub cmd: String,

    /// Prerequisites: this task waits for every task listed here.
    #[serde(default)]
    pub after: Vec<String>,

    /// Retries after the first failed attempt; defaults to 3.
    #[serde(default)]
    pub retries: Option<u32>,

    /// Per-attempt timeout such as `"30s"`; defaults to one hour.
    #[serde(default)]
    pub timeout: Option<String>,

    /// Pause between attempts such as `"500ms"`; defaults to none.
    #[serde(default)]
    pub retry_delay: Option<String>,

    /// Working directory, relative to the config file's directory.
    #[serde(default)]
    pub dir: Option<String>,

    /// Extra environment variables for the command.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

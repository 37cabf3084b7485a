// src/config/mod.rs

//! Pipeline definition files.
//!
//! - [`model`] holds the serde structs mirroring the TOML layout.
//! - [`validate`] turns a [`RawPipelineFile`] into a checked [`PipelineFile`].
//! - [`loader`] reads files and builds a runnable [`Pipeline`](crate::pipeline::Pipeline).

pub mod duration;
pub mod loader;
pub mod model;
pub mod validate;

pub use duration::parse_duration;
pub use loader::{
    config_root_dir, default_config_path, load_and_validate, load_from_path, load_pipeline,
    parse_str,
};
pub use model::{EndpointConfig, PipelineFile, PipelineSection, RawPipelineFile, TaskConfig};

// src/pipeline/endpoint.rs

use crate::errors::{PipelineError, Result};
use crate::types::Value;

/// Descriptor for an external data endpoint (a source or a target).
///
/// Pure configuration: the executor never opens `connection`, it only checks
/// that one is present. Ingestion and sink collaborators interpret the rest.
#[derive(Debug, Clone, PartialEq)]
pub struct Endpoint {
    pub name: String,
    pub connection: String,
    pub kind: String,
    pub schema: Option<Value>,
}

/// Data source descriptor.
pub type Source = Endpoint;

/// Data target descriptor.
pub type Target = Endpoint;

impl Endpoint {
    pub fn new(
        name: impl Into<String>,
        connection: impl Into<String>,
        kind: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            connection: connection.into(),
            kind: kind.into(),
            schema: None,
        }
    }

    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = Some(schema);
        self
    }

    /// The descriptor is opaque: only an empty string is rejected.
    /// `role` is `"Source"` or `"Target"` and only shapes the error.
    pub(crate) fn ensure_connection(&self, role: &'static str) -> Result<()> {
        if self.connection.is_empty() {
            return Err(PipelineError::MissingConnectionDescriptor {
                kind: role,
                name: self.name.clone(),
            });
        }
        Ok(())
    }
}

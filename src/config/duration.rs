// src/config/duration.rs

use std::time::Duration;

use crate::errors::{PipelineError, Result};

/// Parse a duration such as `"250ms"`, `"30s"`, `"5m"` or `"1h"`.
///
/// The number must be a non-negative integer and the unit is mandatory.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return Err(PipelineError::Config("empty duration string".to_string()));
    }

    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| PipelineError::Config(format!("duration '{s}' is missing a unit suffix")))?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part.parse().map_err(|e| {
        PipelineError::Config(format!("invalid duration number '{num_part}': {e}"))
    })?;

    let secs = |mult: u64| {
        value
            .checked_mul(mult)
            .map(Duration::from_secs)
            .ok_or_else(|| PipelineError::Config(format!("duration '{s}' is too large")))
    };

    match unit_part.trim().to_lowercase().as_str() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => secs(1),
        "m" => secs(60),
        "h" => secs(60 * 60),
        unit => Err(PipelineError::Config(format!(
            "unsupported duration unit '{unit}' in '{s}'; expected ms, s, m, or h"
        ))),
    }
}

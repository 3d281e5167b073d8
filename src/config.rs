//! Tunable thresholds, loaded from a JSON file such as
//!
//! ```json
//! { "allowed_relative_ptp_rate_error": "2%" }
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Allowed relative deviation from the nominal message interval (1%).
pub const DEFAULT_RATE_ERROR: f64 = 0.01;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("rate error {0:?} must be a percentage ending in '%'")]
    MissingPercentSign(String),
    #[error("rate error {0:?} is not a number")]
    InvalidNumber(String),
    #[error("rate error {0:?} must be greater than 0% and at most 100%")]
    OutOfRange(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigFile {
    pub allowed_relative_ptp_rate_error: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalysisConfig {
    /// Allowed relative rate error as a fraction (0.01 = 1%).
    pub rate_error: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            rate_error: DEFAULT_RATE_ERROR,
        }
    }
}

impl AnalysisConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = serde_json::from_str(content)?;
        Ok(Self {
            rate_error: parse_percentage(&file.allowed_relative_ptp_rate_error)?,
        })
    }
}

/// Convert `"2%"` into `0.02`.
pub fn parse_percentage(value: &str) -> Result<f64, ConfigError> {
    let number = value
        .trim()
        .strip_suffix('%')
        .ok_or_else(|| ConfigError::MissingPercentSign(value.to_string()))?;

    let percent: f64 = number
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidNumber(value.to_string()))?;

    if !percent.is_finite() || percent <= 0.0 || percent > 100.0 {
        return Err(ConfigError::OutOfRange(value.to_string()));
    }

    Ok(percent / 100.0)
}

//! Configuration error types
//!
//! Error codes:
//! - STRATA_CONFIG_IO (REJECT)
//! - STRATA_CONFIG_PARSE (REJECT)
//! - STRATA_CONFIG_INVALID (REJECT)

use thiserror::Error;

use crate::error::Severity;

/// Configuration loading and validation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("invalid config JSON in {path}: {reason}")]
    Parse { path: String, reason: String },

    #[error("invalid configuration: {field} {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ConfigError::Io { .. } => "STRATA_CONFIG_IO",
            ConfigError::Parse { .. } => "STRATA_CONFIG_PARSE",
            ConfigError::Invalid { .. } => "STRATA_CONFIG_INVALID",
        }
    }

    pub fn severity(&self) -> Severity {
        Severity::Reject
    }
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

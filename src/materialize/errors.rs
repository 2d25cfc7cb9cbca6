//! Materialization error types
//!
//! Error codes:
//! - STRATA_MATERIALIZE_IO (ERROR)
//! - STRATA_MATERIALIZE_MANIFEST (ERROR)
//! - STRATA_MATERIALIZE_INVALID_LIMIT (REJECT)
//! - execution and catalog codes are passed through

use std::path::PathBuf;

use thiserror::Error;

use crate::catalog::CatalogError;
use crate::error::Severity;
use crate::executor::{ExecError, SinkError};
use crate::storage::WriteError;

#[derive(Debug, Error)]
pub enum MaterializeError {
    #[error("materialization I/O failed at {}: {reason}", .path.display())]
    Io { path: PathBuf, reason: String },

    #[error("invalid manifest {}: {reason}", .path.display())]
    Manifest { path: PathBuf, reason: String },

    #[error("max_rows must be >= 1, got {max_rows}")]
    InvalidLimit { max_rows: usize },

    #[error(transparent)]
    Exec(ExecError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

impl MaterializeError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MaterializeError::Io {
            path: path.into(),
            reason: source.to_string(),
        }
    }

    pub(crate) fn manifest(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        MaterializeError::Manifest {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            MaterializeError::Io { .. } => "STRATA_MATERIALIZE_IO",
            MaterializeError::Manifest { .. } => "STRATA_MATERIALIZE_MANIFEST",
            MaterializeError::InvalidLimit { .. } => "STRATA_MATERIALIZE_INVALID_LIMIT",
            MaterializeError::Exec(e) => e.code(),
            MaterializeError::Catalog(e) => e.code(),
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            MaterializeError::InvalidLimit { .. } => Severity::Reject,
            _ => Severity::Error,
        }
    }
}

/// Partition write failures surface as I/O errors; everything else from
/// execution passes through unchanged
impl From<ExecError> for MaterializeError {
    fn from(err: ExecError) -> Self {
        match err {
            ExecError::Sink(SinkError::Write(WriteError::Io { path, reason }))
            | ExecError::Sink(SinkError::Write(WriteError::InvalidBatch { path, reason })) => {
                MaterializeError::Io { path, reason }
            }
            other => MaterializeError::Exec(other),
        }
    }
}

/// Result type for materialization
pub type MaterializeResult<T> = Result<T, MaterializeError>;

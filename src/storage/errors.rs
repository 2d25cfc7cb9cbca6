//! Storage error types
//!
//! Error codes:
//! - STRATA_READ_CORRUPT_PARTITION (ERROR severity)
//! - STRATA_READ_SCHEMA_MISMATCH (ERROR severity)
//! - STRATA_READ_IO (ERROR severity)
//! - STRATA_WRITE_IO (ERROR severity)
//! - STRATA_WRITE_INVALID_BATCH (ERROR severity)
//!
//! Every read error names the partition path; corruption names the column
//! when the damage is local to one chunk.

use std::path::PathBuf;

use thiserror::Error;

use crate::error::Severity;
use crate::schema::SchemaError;

/// Errors raised while reading a partition file
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReadError {
    #[error("corrupt partition {}{}: {reason}", .path.display(), column_suffix(.column))]
    CorruptPartition {
        path: PathBuf,
        column: Option<String>,
        reason: String,
    },

    #[error("schema mismatch in partition {}: {source}", .path.display())]
    SchemaMismatch {
        path: PathBuf,
        #[source]
        source: SchemaError,
    },

    #[error("I/O failure on partition {}: {reason}", .path.display())]
    Io { path: PathBuf, reason: String },
}

fn column_suffix(column: &Option<String>) -> String {
    match column {
        Some(c) => format!(" (column '{}')", c),
        None => String::new(),
    }
}

impl ReadError {
    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        ReadError::CorruptPartition {
            path: path.into(),
            column: None,
            reason: reason.into(),
        }
    }

    pub(crate) fn corrupt_column(
        path: impl Into<PathBuf>,
        column: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        ReadError::CorruptPartition {
            path: path.into(),
            column: Some(column.into()),
            reason: reason.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ReadError::Io {
            path: path.into(),
            reason: source.to_string(),
        }
    }

    /// Returns the stable error code
    pub fn code(&self) -> &'static str {
        match self {
            ReadError::CorruptPartition { .. } => "STRATA_READ_CORRUPT_PARTITION",
            ReadError::SchemaMismatch { .. } => "STRATA_READ_SCHEMA_MISMATCH",
            ReadError::Io { .. } => "STRATA_READ_IO",
        }
    }

    pub fn severity(&self) -> Severity {
        Severity::Error
    }

    /// Path of the partition that failed
    pub fn path(&self) -> &std::path::Path {
        match self {
            ReadError::CorruptPartition { path, .. }
            | ReadError::SchemaMismatch { path, .. }
            | ReadError::Io { path, .. } => path,
        }
    }

    /// True for damage to the file itself, as opposed to a type conflict
    /// or an operating system failure
    pub fn is_corruption(&self) -> bool {
        matches!(self, ReadError::CorruptPartition { .. })
    }
}

/// Result type for partition reads
pub type ReadResult<T> = Result<T, ReadError>;

/// Errors raised while writing a partition file
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WriteError {
    #[error("failed to write partition {}: {reason}", .path.display())]
    Io { path: PathBuf, reason: String },

    #[error("cannot write partition {}: {reason}", .path.display())]
    InvalidBatch { path: PathBuf, reason: String },
}

impl WriteError {
    pub(crate) fn io(path: impl Into<PathBuf>, context: &str, source: std::io::Error) -> Self {
        WriteError::Io {
            path: path.into(),
            reason: format!("{}: {}", context, source),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            WriteError::Io { .. } => "STRATA_WRITE_IO",
            WriteError::InvalidBatch { .. } => "STRATA_WRITE_INVALID_BATCH",
        }
    }

    pub fn severity(&self) -> Severity {
        Severity::Error
    }
}

/// Result type for partition writes
pub type WriteResult<T> = Result<T, WriteError>;

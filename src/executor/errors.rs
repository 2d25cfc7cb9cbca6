//! Execution error types
//!
//! Error codes:
//! - STRATA_EXEC_GROUP_CARDINALITY (ERROR)
//! - STRATA_EXEC_SORT_BUDGET (ERROR)
//! - STRATA_EXEC_ABORTED (ERROR)
//! - STRATA_EXEC_CANCELLED (ERROR)
//! - STRATA_EXEC_ARITHMETIC_OVERFLOW (ERROR)
//! - STRATA_EXEC_INVALID_VALUE (ERROR)
//! - STRATA_EXEC_UNSUPPORTED (ERROR)
//! - STRATA_EXEC_SINK (ERROR)
//! - bridge codes are passed through
//!
//! Errors raised while reading carry the partition path.

use std::path::PathBuf;

use thiserror::Error;

use crate::bridge::BridgeError;
use crate::error::Severity;
use crate::storage::{ReadError, WriteError};

/// Errors raised by a result sink
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SinkError {
    #[error(transparent)]
    Write(#[from] WriteError),

    #[error("sink rejected batch: {reason}")]
    Rejected { reason: String },
}

/// Query execution errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExecError {
    #[error("aggregate exceeded max_groups ({limit}) in groups or distinct values")]
    GroupCardinalityExceeded { limit: usize },

    #[error("sort input of {rows} rows exceeds max_sort_rows ({limit})")]
    SortBudgetExceeded { rows: usize, limit: usize },

    #[error("query aborted at partition {}: {source}", .path.display())]
    Aborted {
        path: PathBuf,
        #[source]
        source: ReadError,
    },

    #[error("query cancelled after {partitions_completed} partitions")]
    Cancelled { partitions_completed: usize },

    #[error("integer overflow in {column}")]
    ArithmeticOverflow { column: String },

    #[error("invalid value in {expr}: {reason}")]
    InvalidValue { expr: String, reason: String },

    #[error("primary engine cannot execute {construct}")]
    UnsupportedOnPrimary { construct: String },

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

impl ExecError {
    pub(crate) fn invalid_value(expr: impl ToString, reason: impl Into<String>) -> Self {
        ExecError::InvalidValue {
            expr: expr.to_string(),
            reason: reason.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ExecError::GroupCardinalityExceeded { .. } => "STRATA_EXEC_GROUP_CARDINALITY",
            ExecError::SortBudgetExceeded { .. } => "STRATA_EXEC_SORT_BUDGET",
            ExecError::Aborted { .. } => "STRATA_EXEC_ABORTED",
            ExecError::Cancelled { .. } => "STRATA_EXEC_CANCELLED",
            ExecError::ArithmeticOverflow { .. } => "STRATA_EXEC_ARITHMETIC_OVERFLOW",
            ExecError::InvalidValue { .. } => "STRATA_EXEC_INVALID_VALUE",
            ExecError::UnsupportedOnPrimary { .. } => "STRATA_EXEC_UNSUPPORTED",
            ExecError::Sink(_) => "STRATA_EXEC_SINK",
            ExecError::Bridge(e) => e.code(),
        }
    }

    pub fn severity(&self) -> Severity {
        Severity::Error
    }

    /// Partition the error was raised on, if any
    pub fn path(&self) -> Option<&std::path::Path> {
        match self {
            ExecError::Aborted { path, .. } => Some(path),
            _ => None,
        }
    }
}

/// Result type for query execution
pub type ExecResult<T> = Result<T, ExecError>;

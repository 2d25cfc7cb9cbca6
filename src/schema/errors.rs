//! Schema error types
//!
//! Error codes:
//! - STRATA_SCHEMA_DUPLICATE_COLUMN (REJECT)
//! - STRATA_SCHEMA_UNKNOWN_TYPE (REJECT)
//! - STRATA_SCHEMA_EMPTY (REJECT)
//! - STRATA_SCHEMA_MALFORMED (REJECT)
//! - STRATA_SCHEMA_INCOMPATIBLE_TYPE (REJECT, fatal to the partition being read)

use thiserror::Error;

use crate::error::Severity;

/// Schema binding and coercion errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("duplicate column '{0}' in schema")]
    DuplicateColumn(String),

    #[error("unknown type '{type_name}' for column '{column}'")]
    UnknownType { column: String, type_name: String },

    #[error("schema must declare at least one column")]
    Empty,

    #[error("malformed schema specification '{source_name}': {reason}")]
    Malformed { source_name: String, reason: String },

    #[error("column '{column}' cannot be coerced from {physical} to {target}: {reason}")]
    IncompatibleType {
        column: String,
        physical: String,
        target: String,
        reason: String,
    },
}

impl SchemaError {
    /// Returns the stable error code
    pub fn code(&self) -> &'static str {
        match self {
            SchemaError::DuplicateColumn(_) => "STRATA_SCHEMA_DUPLICATE_COLUMN",
            SchemaError::UnknownType { .. } => "STRATA_SCHEMA_UNKNOWN_TYPE",
            SchemaError::Empty => "STRATA_SCHEMA_EMPTY",
            SchemaError::Malformed { .. } => "STRATA_SCHEMA_MALFORMED",
            SchemaError::IncompatibleType { .. } => "STRATA_SCHEMA_INCOMPATIBLE_TYPE",
        }
    }

    /// Schema errors never touch disk state and are always rejections
    pub fn severity(&self) -> Severity {
        Severity::Reject
    }

    /// Column named by the error, if any
    pub fn column(&self) -> Option<&str> {
        match self {
            SchemaError::DuplicateColumn(c) => Some(c),
            SchemaError::UnknownType { column, .. } => Some(column),
            SchemaError::IncompatibleType { column, .. } => Some(column),
            SchemaError::Empty | SchemaError::Malformed { .. } => None,
        }
    }
}

/// Result type for schema operations
pub type SchemaResult<T> = Result<T, SchemaError>;

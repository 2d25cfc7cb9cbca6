//! Catalog error types
//!
//! Error codes:
//! - STRATA_CATALOG_NO_PARTITIONS (ERROR)
//! - STRATA_CATALOG_UNREADABLE_LAYOUT (ERROR)
//! - STRATA_CATALOG_IO (ERROR)
//! - STRATA_CATALOG_PARTITION_OUT_OF_RANGE (ERROR)
//! - underlying read codes for header and statistics reads

use std::path::PathBuf;

use thiserror::Error;

use crate::error::Severity;
use crate::storage::ReadError;

/// Dataset enumeration and statistics errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CatalogError {
    #[error("no partition files found under {}", .root.display())]
    NoPartitionsFound { root: PathBuf },

    #[error("unreadable layout under {}: {reason}", .root.display())]
    UnreadableLayout { root: PathBuf, reason: String },

    #[error("failed to enumerate {}: {reason}", .path.display())]
    Io { path: PathBuf, reason: String },

    #[error("partition index {index} out of range for {count} partitions")]
    PartitionOutOfRange { index: usize, count: usize },

    #[error(transparent)]
    Read(#[from] ReadError),
}

impl CatalogError {
    pub fn code(&self) -> &'static str {
        match self {
            CatalogError::NoPartitionsFound { .. } => "STRATA_CATALOG_NO_PARTITIONS",
            CatalogError::UnreadableLayout { .. } => "STRATA_CATALOG_UNREADABLE_LAYOUT",
            CatalogError::Io { .. } => "STRATA_CATALOG_IO",
            CatalogError::PartitionOutOfRange { .. } => "STRATA_CATALOG_PARTITION_OUT_OF_RANGE",
            CatalogError::Read(e) => e.code(),
        }
    }

    pub fn severity(&self) -> Severity {
        Severity::Error
    }
}

/// Result type for catalog operations
pub type CatalogResult<T> = Result<T, CatalogError>;

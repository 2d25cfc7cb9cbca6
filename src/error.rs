//! Crate-level error type
//!
//! Every subsystem owns its error enum and result alias. `StrataError`
//! unifies them for the `Session` facade so callers can use `?` across
//! opening, planning and materializing.

use std::fmt;

use thiserror::Error;

use crate::bridge::BridgeError;
use crate::catalog::CatalogError;
use crate::config::ConfigError;
use crate::executor::ExecError;
use crate::materialize::MaterializeError;
use crate::planner::PlanError;
use crate::schema::SchemaError;
use crate::storage::ReadError;

/// How an error should be treated by a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Build-time rejection; nothing touched disk, rewrite the request.
    Reject,
    /// Execution failure for this query; the process is healthy.
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Reject => write!(f, "REJECT"),
            Severity::Error => write!(f, "ERROR"),
        }
    }
}

/// Unified error for the `Session` API.
#[derive(Debug, Error)]
pub enum StrataError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Read(#[from] ReadError),

    #[error(transparent)]
    Exec(#[from] ExecError),

    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error(transparent)]
    Materialize(#[from] MaterializeError),
}

impl StrataError {
    /// Stable error code of the underlying subsystem error.
    pub fn code(&self) -> &'static str {
        match self {
            StrataError::Config(e) => e.code(),
            StrataError::Catalog(e) => e.code(),
            StrataError::Schema(e) => e.code(),
            StrataError::Plan(e) => e.code(),
            StrataError::Read(e) => e.code(),
            StrataError::Exec(e) => e.code(),
            StrataError::Bridge(e) => e.code(),
            StrataError::Materialize(e) => e.code(),
        }
    }

    /// Severity of the underlying error.
    pub fn severity(&self) -> Severity {
        match self {
            StrataError::Config(_) | StrataError::Schema(_) | StrataError::Plan(_) => {
                Severity::Reject
            }
            StrataError::Catalog(_)
            | StrataError::Read(_)
            | StrataError::Exec(_)
            | StrataError::Bridge(_)
            | StrataError::Materialize(_) => Severity::Error,
        }
    }
}

/// Result type for the `Session` API
pub type StrataResult<T> = Result<T, StrataError>;

//! Planner error types
//!
//! Error codes:
//! - STRATA_PLAN_UNKNOWN_COLUMN (REJECT)
//! - STRATA_PLAN_TYPE_MISMATCH (REJECT)
//! - STRATA_PLAN_UNSUPPORTED_EXPRESSION (REJECT)
//! - STRATA_PLAN_INVALID (REJECT)
//!
//! All planner errors are raised while the plan is being built, before any
//! partition is read.

use thiserror::Error;

use crate::error::Severity;

/// Plan construction errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("unknown column '{column}'")]
    UnknownColumn { column: String },

    #[error("type mismatch in {expr}: {reason}")]
    TypeMismatch { expr: String, reason: String },

    #[error("unsupported on the primary engine: {construct}")]
    UnsupportedExpression { construct: String },

    #[error("invalid plan: {reason}")]
    InvalidPlan { reason: String },
}

impl PlanError {
    pub(crate) fn unknown_column(column: impl Into<String>) -> Self {
        PlanError::UnknownColumn {
            column: column.into(),
        }
    }

    pub(crate) fn type_mismatch(expr: impl ToString, reason: impl Into<String>) -> Self {
        PlanError::TypeMismatch {
            expr: expr.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn unsupported(construct: impl Into<String>) -> Self {
        PlanError::UnsupportedExpression {
            construct: construct.into(),
        }
    }

    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        PlanError::InvalidPlan {
            reason: reason.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            PlanError::UnknownColumn { .. } => "STRATA_PLAN_UNKNOWN_COLUMN",
            PlanError::TypeMismatch { .. } => "STRATA_PLAN_TYPE_MISMATCH",
            PlanError::UnsupportedExpression { .. } => "STRATA_PLAN_UNSUPPORTED_EXPRESSION",
            PlanError::InvalidPlan { .. } => "STRATA_PLAN_INVALID",
        }
    }

    pub fn severity(&self) -> Severity {
        Severity::Reject
    }

    /// True if routing the node to the secondary engine could succeed
    pub fn is_unsupported(&self) -> bool {
        matches!(self, PlanError::UnsupportedExpression { .. })
    }
}

/// Result type for plan construction
pub type PlanResult<T> = Result<T, PlanError>;

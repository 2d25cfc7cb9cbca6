//! Bridge error types
//!
//! Error codes:
//! - STRATA_BRIDGE_INCOMPATIBLE_ENGINE (ERROR)
//!
//! An incompatible-engine failure is terminal for the query; there is no
//! fallback back to the primary engine.

use thiserror::Error;

use crate::error::Severity;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    #[error("secondary engine cannot complete the plan: {reason}")]
    IncompatibleEngine { reason: String },
}

impl BridgeError {
    pub(crate) fn incompatible(reason: impl Into<String>) -> Self {
        BridgeError::IncompatibleEngine {
            reason: reason.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            BridgeError::IncompatibleEngine { .. } => "STRATA_BRIDGE_INCOMPATIBLE_ENGINE",
        }
    }

    pub fn severity(&self) -> Severity {
        Severity::Error
    }
}

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_and_message() {
        let err = BridgeError::incompatible("input exceeds 10 rows");
        assert_eq!(err.code(), "STRATA_BRIDGE_INCOMPATIBLE_ENGINE");
        assert_eq!(err.severity(), Severity::Error);
        assert!(err.to_string().contains("exceeds 10 rows"));
    }
}

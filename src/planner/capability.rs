//! Engine capability declarations
//!
//! The planner asks the engine that will own a node whether it can run the
//! node before building it. Nothing here is discovered at execution time.

use std::fmt;

use crate::config::EngineConfig;

use super::expr::{Expr, StringFunc};

/// What an engine can execute
pub trait EngineCapabilities: fmt::Debug + Send + Sync {
    /// Engine name used in error messages
    fn name(&self) -> &'static str;

    /// First construct of `expr` the engine cannot evaluate
    fn unsupported_construct(&self, expr: &Expr) -> Option<String>;

    fn supports_join(&self) -> bool;

    /// Largest number of rows one in-memory sort may hold
    fn max_sort_rows(&self) -> usize;

    /// Largest number of groups one aggregate may hold
    fn max_groups(&self) -> usize;
}

/// Capabilities of the streaming columnar engine.
///
/// Everything except pattern matching, string functions, joins and sorts
/// estimated above `max_sort_rows`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimaryCapabilities {
    pub max_sort_rows: usize,
    pub max_groups: usize,
}

impl PrimaryCapabilities {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            max_sort_rows: config.max_sort_rows,
            max_groups: config.max_groups,
        }
    }
}

impl Default for PrimaryCapabilities {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl EngineCapabilities for PrimaryCapabilities {
    fn name(&self) -> &'static str {
        "primary"
    }

    fn unsupported_construct(&self, expr: &Expr) -> Option<String> {
        expr.find_construct(&|e: &Expr| match e {
            Expr::Like { pattern, .. } => Some(format!("LIKE '{}'", pattern)),
            Expr::StringFn { func, .. } => Some(
                match func {
                    StringFunc::Lower => "lower()",
                    StringFunc::Upper => "upper()",
                    StringFunc::Length => "length()",
                }
                .to_string(),
            ),
            _ => None,
        })
    }

    fn supports_join(&self) -> bool {
        false
    }

    fn max_sort_rows(&self) -> usize {
        self.max_sort_rows
    }

    fn max_groups(&self) -> usize {
        self.max_groups
    }
}

/// Capabilities of the row-oriented secondary engine: everything
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SecondaryCapabilities;

impl EngineCapabilities for SecondaryCapabilities {
    fn name(&self) -> &'static str {
        "secondary"
    }

    fn unsupported_construct(&self, _expr: &Expr) -> Option<String> {
        None
    }

    fn supports_join(&self) -> bool {
        true
    }

    fn max_sort_rows(&self) -> usize {
        usize::MAX
    }

    fn max_groups(&self) -> usize {
        usize::MAX
    }
}

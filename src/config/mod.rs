//! Engine and materialization configuration
//!
//! Configuration is loaded from JSON, validated once, and immutable after
//! a `Session` is built from it.
//!
//! ```json
//! {
//!   "engine": { "workers": 8, "max_groups": 1000000 },
//!   "materialize": { "max_rows": 10000 }
//! }
//! ```
//!
//! Every engine field has a default. `materialize.max_rows` does not: an
//! in-memory result bound must always be chosen explicitly.

mod errors;

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::schema::CoercionMode;

pub use errors::{ConfigError, ConfigResult};

/// What the engine does when a partition turns out to be corrupt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorruptPartitionPolicy {
    /// Fail the query naming the partition
    #[default]
    Abort,
    /// Log a warning, count the partition as skipped, continue
    Skip,
}

/// Execution engine limits and policies
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Partitions processed concurrently (size of one wave)
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Upper bound on distinct groups held by one aggregate
    #[serde(default = "default_max_groups")]
    pub max_groups: usize,

    /// Upper bound on rows held by one in-memory sort
    #[serde(default = "default_max_sort_rows")]
    pub max_sort_rows: usize,

    /// Upper bound on rows fed into the secondary engine
    #[serde(default = "default_secondary_max_rows")]
    pub secondary_max_rows: usize,

    #[serde(default)]
    pub on_corrupt_partition: CorruptPartitionPolicy,

    #[serde(default)]
    pub coercion_mode: CoercionMode,

    /// Merge partial aggregates in partition order (bit-identical results)
    /// rather than as workers finish
    #[serde(default = "default_deterministic_merge")]
    pub deterministic_merge: bool,
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}
fn default_max_groups() -> usize {
    1_000_000
}
fn default_max_sort_rows() -> usize {
    5_000_000
}
fn default_secondary_max_rows() -> usize {
    1_000_000
}
fn default_deterministic_merge() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            max_groups: default_max_groups(),
            max_sort_rows: default_max_sort_rows(),
            secondary_max_rows: default_secondary_max_rows(),
            on_corrupt_partition: CorruptPartitionPolicy::default(),
            coercion_mode: CoercionMode::default(),
            deterministic_merge: default_deterministic_merge(),
        }
    }
}

impl EngineConfig {
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_max_groups(mut self, max_groups: usize) -> Self {
        self.max_groups = max_groups;
        self
    }

    pub fn with_max_sort_rows(mut self, max_sort_rows: usize) -> Self {
        self.max_sort_rows = max_sort_rows;
        self
    }

    pub fn with_secondary_max_rows(mut self, rows: usize) -> Self {
        self.secondary_max_rows = rows;
        self
    }

    pub fn with_corrupt_policy(mut self, policy: CorruptPartitionPolicy) -> Self {
        self.on_corrupt_partition = policy;
        self
    }

    pub fn with_coercion_mode(mut self, mode: CoercionMode) -> Self {
        self.coercion_mode = mode;
        self
    }

    pub fn with_deterministic_merge(mut self, deterministic: bool) -> Self {
        self.deterministic_merge = deterministic;
        self
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.workers == 0 {
            return Err(ConfigError::invalid("engine.workers", "must be >= 1"));
        }
        if self.max_groups == 0 {
            return Err(ConfigError::invalid("engine.max_groups", "must be >= 1"));
        }
        if self.max_sort_rows == 0 {
            return Err(ConfigError::invalid("engine.max_sort_rows", "must be >= 1"));
        }
        if self.secondary_max_rows == 0 {
            return Err(ConfigError::invalid(
                "engine.secondary_max_rows",
                "must be >= 1",
            ));
        }
        Ok(())
    }
}

/// Bound on in-memory results. Deliberately has no `Default`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterializeConfig {
    pub max_rows: usize,
}

impl MaterializeConfig {
    pub fn new(max_rows: usize) -> Self {
        Self { max_rows }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_rows == 0 {
            return Err(ConfigError::invalid("materialize.max_rows", "must be >= 1"));
        }
        Ok(())
    }
}

/// Top-level configuration file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrataConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    pub materialize: MaterializeConfig,
}

impl StrataConfig {
    pub fn new(engine: EngineConfig, materialize: MaterializeConfig) -> Self {
        Self {
            engine,
            materialize,
        }
    }

    /// Load configuration from file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let config: StrataConfig =
            serde_json::from_str(&content).map_err(|e| ConfigError::Parse {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        self.engine.validate()?;
        self.materialize.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_engine_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.workers >= 1);
        assert!(config.deterministic_merge);
        assert_eq!(config.on_corrupt_partition, CorruptPartitionPolicy::Abort);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_workers_rejected() {
        let err = EngineConfig::default().with_workers(0).validate().unwrap_err();
        assert_eq!(err.code(), "STRATA_CONFIG_INVALID");
        assert!(err.to_string().contains("engine.workers"));
    }

    #[test]
    fn test_load_requires_max_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("strata.json");
        std::fs::write(&path, r#"{"engine": {"workers": 2}}"#).unwrap();
        let err = StrataConfig::load(&path).unwrap_err();
        assert_eq!(err.code(), "STRATA_CONFIG_PARSE");
    }

    #[test]
    fn test_load_fills_engine_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("strata.json");
        std::fs::write(
            &path,
            r#"{"engine": {"workers": 2, "on_corrupt_partition": "skip", "coercion_mode": "best_effort"},
                "materialize": {"max_rows": 100}}"#,
        )
        .unwrap();
        let config = StrataConfig::load(&path).unwrap();
        assert_eq!(config.engine.workers, 2);
        assert_eq!(config.engine.on_corrupt_partition, CorruptPartitionPolicy::Skip);
        assert_eq!(config.engine.coercion_mode, CoercionMode::BestEffort);
        assert_eq!(config.engine.max_groups, 1_000_000);
        assert_eq!(config.materialize.max_rows, 100);
    }

    #[test]
    fn test_zero_max_rows_rejected() {
        let config = StrataConfig::new(EngineConfig::default(), MaterializeConfig::new(0));
        assert!(config.validate().is_err());
    }
}

//! Session facade
//!
//! A `Session` wires one configuration into a catalog, an execution engine
//! and a materialization gate that all share the same reader, so I/O
//! counters and residency tracking cover everything the session does.
//!
//! ```ignore
//! let session = Session::new(config)?;
//! let sales = session.open_dataset("/data/sales", &spec)?;
//! let plan = session
//!     .scan(&sales, &["region", "amount"])?
//!     .filter(col("amount").gt(lit(100)))?
//!     .aggregate(&["region"], vec![AggregateExpr::sum(col("amount"))])?;
//! let table = session.to_memory(&plan)?;
//! ```

use std::path::Path;
use std::sync::Arc;

use crate::catalog::{DatasetHandle, PartitionCatalog, PartitionStats};
use crate::config::StrataConfig;
use crate::error::StrataResult;
use crate::executor::{CancellationToken, ExecutionEngine};
use crate::materialize::{DurableIntermediate, InMemoryTable, MaterializationGate};
use crate::planner::{EngineCapabilities, PrimaryCapabilities, QueryPlan};
use crate::schema::{RawSchemaSpec, SchemaRegistry};
use crate::storage::{ColumnarReader, IoSnapshot, ResidencyTracker};

#[derive(Debug, Clone)]
pub struct Session {
    config: StrataConfig,
    catalog: PartitionCatalog,
    gate: MaterializationGate,
    caps: Arc<dyn EngineCapabilities>,
}

impl Session {
    /// Validates `config` and builds the worker pool
    pub fn new(config: StrataConfig) -> StrataResult<Self> {
        config.validate()?;
        let reader = ColumnarReader::new();
        let catalog = PartitionCatalog::new(reader.clone(), config.engine.coercion_mode);
        let engine = ExecutionEngine::new(config.engine.clone(), reader)?;
        let caps: Arc<dyn EngineCapabilities> =
            Arc::new(PrimaryCapabilities::from_config(&config.engine));
        Ok(Self {
            config,
            catalog,
            gate: MaterializationGate::new(engine),
            caps,
        })
    }

    pub fn config(&self) -> &StrataConfig {
        &self.config
    }

    pub fn catalog(&self) -> &PartitionCatalog {
        &self.catalog
    }

    pub fn engine(&self) -> &ExecutionEngine {
        self.gate.engine()
    }

    pub fn gate(&self) -> &MaterializationGate {
        &self.gate
    }

    /// Binds `spec` and enumerates the partitions under `root`.
    ///
    /// Reads partition headers only.
    pub fn open_dataset(
        &self,
        root: impl AsRef<Path>,
        spec: &RawSchemaSpec,
    ) -> StrataResult<DatasetHandle> {
        let schema = SchemaRegistry::bind(spec)?;
        Ok(self.catalog.open(root.as_ref(), schema)?)
    }

    /// Starts a plan whose routing follows this session's engine limits
    pub fn scan<S: AsRef<str>>(&self, dataset: &DatasetHandle, columns: &[S]) -> StrataResult<QueryPlan> {
        Ok(QueryPlan::scan_with(dataset, columns, Arc::clone(&self.caps))?)
    }

    /// Materializes `plan` in memory bounded by `materialize.max_rows`
    pub fn to_memory(&self, plan: &QueryPlan) -> StrataResult<InMemoryTable> {
        self.to_memory_with_limit(plan, self.config.materialize.max_rows)
    }

    pub fn to_memory_with_limit(&self, plan: &QueryPlan, max_rows: usize) -> StrataResult<InMemoryTable> {
        Ok(self.gate.to_memory(plan, max_rows)?)
    }

    pub fn to_durable(&self, plan: &QueryPlan, dir: impl AsRef<Path>) -> StrataResult<DurableIntermediate> {
        Ok(self.gate.to_durable(plan, dir.as_ref())?)
    }

    /// Reopens a durable result through this session's catalog
    pub fn reopen(&self, durable: &DurableIntermediate) -> StrataResult<DatasetHandle> {
        Ok(durable.open_with(&self.catalog)?)
    }

    /// Statistics of one partition, computed on first request
    pub fn stats_for(&self, dataset: &DatasetHandle, index: usize) -> StrataResult<Arc<PartitionStats>> {
        Ok(self.catalog.stats_for(dataset, index)?)
    }

    /// Token that cancels queries running on this session
    pub fn cancellation_token(&self) -> CancellationToken {
        self.engine().cancellation_token().clone()
    }

    pub fn io_counters(&self) -> IoSnapshot {
        self.catalog.reader().counters().snapshot()
    }

    pub fn residency(&self) -> &Arc<ResidencyTracker> {
        self.catalog.reader().residency()
    }
}

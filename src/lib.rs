//! strata - an out-of-core columnar query core
//!
//! Lazily built query plans over partitioned columnar datasets, executed
//! partition by partition with bounded memory, with an in-memory secondary
//! engine for constructs the streaming engine cannot run.

pub mod bridge;
pub mod catalog;
pub mod column;
pub mod config;
pub mod error;
pub mod executor;
pub mod materialize;
pub mod observability;
pub mod planner;
pub mod schema;
pub mod session;
pub mod storage;

pub use column::{Batch, ColumnBuffer, ColumnData, Scalar};
pub use config::{CorruptPartitionPolicy, EngineConfig, MaterializeConfig, StrataConfig};
pub use error::{Severity, StrataError, StrataResult};
pub use materialize::{DurableIntermediate, InMemoryTable, ResultHandle};
pub use planner::{col, lit, AggregateExpr, Expr, QueryPlan, SortKey};
pub use schema::{CoercionMode, LogicalSchema, LogicalType, RawSchemaSpec};
pub use session::Session;

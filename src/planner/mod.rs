//! Logical Query Builder subsystem for strata
//!
//! Builds immutable query plans over a dataset without reading data.
//!
//! # Design Principles
//!
//! - Lazy: building a plan performs no partition I/O
//! - Fail-fast: unknown columns, type errors and unsupported constructs are
//!   rejected when the node is added
//! - Explicit routing: every node is owned by exactly one engine, and work
//!   moves to the secondary engine only through a `BridgeOut` boundary
//! - Immutable: builder calls return new plans sharing earlier nodes

mod capability;
mod errors;
mod explain;
mod expr;
mod plan;

pub use capability::{EngineCapabilities, PrimaryCapabilities, SecondaryCapabilities};
pub use errors::{PlanError, PlanResult};
pub use explain::{ExplainLine, ExplainPlan, PlanDescription};
pub use expr::{col, lit, AggFunc, AggregateExpr, Expr, NamedExpr, SortKey, StringFunc};
pub use plan::{Engine, NodeKind, PlanNode, QueryPlan};

pub(crate) use expr::arith_result_type;

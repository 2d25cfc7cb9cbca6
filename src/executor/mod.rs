//! Query execution subsystem for strata
//!
//! The executor runs primary-owned plans out of core and hands
//! secondary-owned subtrees to the bridge.
//!
//! # Execution Flow (strict order)
//!
//! 1. Prune partitions whose cached statistics exclude every row
//! 2. Read surviving partitions in waves of `workers`
//! 3. Filter and project each partition independently
//! 4. Feed partition outputs, in partition order, to the blocking node
//! 5. Run the remaining nodes on the bounded blocking output
//! 6. Push output batches into the sink
//!
//! # Design Principles
//!
//! - Resident data is bounded by the wave, never the dataset
//! - Output is identical for any worker count
//! - Fail loudly on corruption unless the skip policy is configured
//! - Cancellation is observed between partitions

mod aggregate;
mod cancel;
mod engine;
mod errors;
mod eval;
mod sink;
mod sorter;

pub(crate) use aggregate::{AggregateInputs, GroupTable};
pub use cancel::CancellationToken;
pub use engine::{ExecStats, ExecutionEngine};
pub use errors::{ExecError, ExecResult, SinkError};
pub(crate) use eval::PhysicalExpr;
pub use sink::{BatchSink, CollectSink, SinkState};
pub(crate) use sorter::ResolvedKeys;

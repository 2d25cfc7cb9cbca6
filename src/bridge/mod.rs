//! Secondary execution bridge for strata
//!
//! Plans the primary engine cannot run completely are handed to an
//! in-memory row engine that supports every node and expression.
//!
//! # Flow
//!
//! 1. Translate the secondary-owned subtree into a row plan
//! 2. Run each `BridgeOut` prefix on the primary engine as a row source
//! 3. Interpret the row plan in memory
//! 4. Convert rows back to batches with the plan's output schema
//!
//! # Design Principles
//!
//! - Every secondary input is bounded by `secondary_max_rows`
//! - Failures are terminal; nothing falls back to the primary engine
//! - Output is indistinguishable from primary output

mod bridge;
mod errors;
mod row_engine;
mod translate;

pub use bridge::SecondaryBridge;
pub use errors::{BridgeError, BridgeResult};

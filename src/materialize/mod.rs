//! Materialization gate for strata
//!
//! Turns plans into result handles. A plan never yields rows except
//! through this gate.
//!
//! # Design Principles
//!
//! - Every in-memory result has an explicit row bound
//! - Truncation is reported, never silent
//! - Durable results are ordinary datasets plus a manifest
//! - Describing a result never touches disk

mod errors;
mod gate;
mod manifest;
mod result;
mod sinks;

pub use errors::{MaterializeError, MaterializeResult};
pub use gate::MaterializationGate;
pub use manifest::{DurableManifest, MANIFEST_FILE};
pub use result::{
    DurableIntermediate, InMemoryTable, ResultDescription, ResultHandle, ResultKind,
};
pub use sinks::{DurableSink, MemorySink};

//! Schema Registry subsystem for strata
//!
//! A dataset is read through exactly one logical schema. Partition files
//! carry physical types; the registry decides which physical types may be
//! read as which logical types and converts them.
//!
//! # Design Principles
//!
//! - Closed set of logical types, matched exhaustively
//! - Binding happens once, before any partition is touched
//! - Coercion only widens; narrowing is an error, never a silent cast
//! - Text parse failures fail the partition unless best-effort is requested

mod coerce;
mod errors;
mod registry;
mod types;

pub use coerce::{coerce_column, is_coercible, CoercionMode};
pub use errors::{SchemaError, SchemaResult};
pub use registry::SchemaRegistry;
pub use types::{Field, LogicalSchema, LogicalType, RawColumn, RawSchemaSpec};

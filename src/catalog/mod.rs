//! Partition Catalog subsystem for strata
//!
//! Presents a directory tree of partition files as one logical table.
//!
//! # Design Principles
//!
//! - Opening a dataset reads headers only, never column data
//! - Deterministic partition order (lexicographic by path)
//! - Inconsistent layouts are refused rather than guessed at
//! - Statistics are lazy, cached, and never computed implicitly

mod catalog;
mod dataset;
mod errors;
mod stats;

pub use catalog::PartitionCatalog;
pub use dataset::{DatasetDescription, DatasetHandle, PartitionDescriptor};
pub use errors::{CatalogError, CatalogResult};
pub use stats::{ColumnStats, PartitionStats};

//! Columnar partition storage for strata
//!
//! A dataset is a directory tree of `.scol` partition files. Each file is
//! self-describing: a checksummed header lists every column chunk with its
//! physical type, offset, length and checksum, so a reader can fetch just
//! the columns a query needs.
//!
//! # Design Principles
//!
//! - Column pruning through the header's column directory
//! - Checksum-verified on every read
//! - Writes are atomic per file (temp file, fsync, rename)
//! - Corruption is reported with the partition path, never repaired

mod checksum;
mod errors;
mod layout;
mod reader;
mod writer;

pub use checksum::{compute_checksum, verify_checksum};
pub use errors::{ReadError, ReadResult, WriteError, WriteResult};
pub use layout::{
    ColumnEntry, PartitionHeader, PhysicalColumn, PhysicalType, FORMAT_VERSION, MAGIC,
    PARTITION_EXTENSION,
};
pub use reader::{ColumnarReader, IoCounters, IoSnapshot, ResidencyGuard, ResidencyTracker};
pub use writer::PartitionWriter;

//! Partition descriptors and dataset handles

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::schema::LogicalSchema;

use super::stats::PartitionStats;

/// One partition file of a dataset.
///
/// Row count comes from the header read at open time. Statistics are
/// computed on first request and cached; concurrent computations may race
/// and the last writer wins.
#[derive(Debug)]
pub struct PartitionDescriptor {
    path: PathBuf,
    row_count: u64,
    index: usize,
    stats: RwLock<Option<Arc<PartitionStats>>>,
}

impl PartitionDescriptor {
    pub fn new(path: impl Into<PathBuf>, row_count: u64, index: usize) -> Self {
        Self {
            path: path.into(),
            row_count,
            index,
            stats: RwLock::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn row_count(&self) -> u64 {
        self.row_count
    }

    /// Position in catalog (lexicographic) order
    pub fn index(&self) -> usize {
        self.index
    }

    /// Statistics if already computed. Never triggers I/O.
    pub fn cached_stats(&self) -> Option<Arc<PartitionStats>> {
        self.stats.read().clone()
    }

    pub(crate) fn store_stats(&self, stats: Arc<PartitionStats>) {
        *self.stats.write() = Some(stats);
    }
}

/// Logical table over an ordered set of partitions.
///
/// Cheap to clone. Partition columns are validated against the schema
/// lazily, when a partition is first read.
#[derive(Debug, Clone)]
pub struct DatasetHandle {
    root: PathBuf,
    schema: LogicalSchema,
    partitions: Arc<[Arc<PartitionDescriptor>]>,
}

impl DatasetHandle {
    pub(crate) fn new(
        root: PathBuf,
        schema: LogicalSchema,
        partitions: Vec<Arc<PartitionDescriptor>>,
    ) -> Self {
        Self {
            root,
            schema,
            partitions: partitions.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn schema(&self) -> &LogicalSchema {
        &self.schema
    }

    pub fn partitions(&self) -> &[Arc<PartitionDescriptor>] {
        &self.partitions
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    /// Sum of partition row counts
    pub fn total_rows(&self) -> u64 {
        self.partitions.iter().map(|p| p.row_count()).sum()
    }

    /// Metadata summary; performs no I/O
    pub fn describe(&self) -> DatasetDescription {
        DatasetDescription {
            root: self.root.clone(),
            schema: self.schema.clone(),
            partition_count: self.partitions.len(),
            column_count: self.schema.len(),
            total_rows: self.total_rows(),
        }
    }

    /// Same dataset with partitions visited in `order`.
    ///
    /// `order` must be a permutation of `0..partition_count()`; entries
    /// out of range are ignored. Descriptors and their cached statistics
    /// are shared with `self`.
    pub fn permuted(&self, order: &[usize]) -> Self {
        let partitions = order
            .iter()
            .filter_map(|&i| self.partitions.get(i).cloned())
            .collect::<Vec<_>>();
        Self {
            root: self.root.clone(),
            schema: self.schema.clone(),
            partitions: partitions.into(),
        }
    }
}

/// Result of `DatasetHandle::describe`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetDescription {
    pub root: PathBuf,
    pub schema: LogicalSchema,
    pub partition_count: usize,
    pub column_count: usize,
    pub total_rows: u64,
}

impl fmt::Display for DatasetDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} partitions, {} columns, {} rows {}",
            self.partition_count, self.column_count, self.total_rows, self.schema
        )
    }
}

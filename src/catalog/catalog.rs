//! Partition enumeration and statistics

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::observability::{log_event, Event};
use crate::schema::{CoercionMode, LogicalSchema};
use crate::storage::{ColumnarReader, PARTITION_EXTENSION};

use super::dataset::{DatasetHandle, PartitionDescriptor};
use super::errors::{CatalogError, CatalogResult};
use super::stats::PartitionStats;

/// Data file formats this crate does not read. Finding one next to
/// partition files means the directory is not a single dataset.
const FOREIGN_EXTENSIONS: &[&str] = &["csv", "parquet", "json", "arrow", "orc", "avro"];

/// Enumerates datasets and computes partition statistics
#[derive(Debug, Clone, Default)]
pub struct PartitionCatalog {
    reader: ColumnarReader,
    coercion_mode: CoercionMode,
}

impl PartitionCatalog {
    pub fn new(reader: ColumnarReader, coercion_mode: CoercionMode) -> Self {
        Self {
            reader,
            coercion_mode,
        }
    }

    pub fn reader(&self) -> &ColumnarReader {
        &self.reader
    }

    /// Opens every `.scol` file under `root` as one dataset.
    ///
    /// Files are ordered lexicographically by path. Entries whose name
    /// starts with `.` or `_` are ignored. Only partition headers are read.
    pub fn open(&self, root: &Path, schema: LogicalSchema) -> CatalogResult<DatasetHandle> {
        let metadata = fs::metadata(root).map_err(|e| CatalogError::Io {
            path: root.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut found = Vec::new();
        let mut foreign = Vec::new();
        if metadata.is_file() {
            if is_partition_file(root) {
                found.push((root.to_path_buf(), 0));
            }
        } else {
            walk(root, 0, &mut found, &mut foreign)?;
        }

        if found.is_empty() {
            return Err(CatalogError::NoPartitionsFound {
                root: root.to_path_buf(),
            });
        }
        if let Some(other) = foreign.first() {
            return Err(CatalogError::UnreadableLayout {
                root: root.to_path_buf(),
                reason: format!(
                    "mixed data formats: {} alongside .{} partitions",
                    other.display(),
                    PARTITION_EXTENSION
                ),
            });
        }
        let depth = found[0].1;
        if let Some((path, other)) = found.iter().find(|(_, d)| *d != depth) {
            return Err(CatalogError::UnreadableLayout {
                root: root.to_path_buf(),
                reason: format!(
                    "partition files at differing depths ({} is at depth {}, expected {})",
                    path.display(),
                    other,
                    depth
                ),
            });
        }

        found.sort_by(|a, b| a.0.cmp(&b.0));
        let files: Vec<PathBuf> = found.into_iter().map(|(path, _)| path).collect();
        self.open_files(root, &files, schema)
    }

    /// Opens exactly `files`, in the given order, as one dataset rooted at
    /// `root`. Nothing else under `root` is consulted.
    pub fn open_files(
        &self,
        root: &Path,
        files: &[PathBuf],
        schema: LogicalSchema,
    ) -> CatalogResult<DatasetHandle> {
        if files.is_empty() {
            return Err(CatalogError::NoPartitionsFound {
                root: root.to_path_buf(),
            });
        }
        let mut partitions = Vec::with_capacity(files.len());
        for (index, path) in files.iter().enumerate() {
            let header = self.reader.read_header(path)?;
            partitions.push(Arc::new(PartitionDescriptor::new(
                path.clone(),
                header.row_count,
                index,
            )));
        }

        let dataset = DatasetHandle::new(root.to_path_buf(), schema, partitions);
        log_event(
            Event::DatasetOpened,
            &[
                ("root", root.display().to_string().as_str()),
                ("partitions", dataset.partition_count().to_string().as_str()),
                ("rows", dataset.total_rows().to_string().as_str()),
            ],
        );
        Ok(dataset)
    }

    /// Statistics of one partition, computed by a full pass on first request
    pub fn stats_for(
        &self,
        dataset: &DatasetHandle,
        index: usize,
    ) -> CatalogResult<Arc<PartitionStats>> {
        let partition = dataset
            .partitions()
            .get(index)
            .ok_or(CatalogError::PartitionOutOfRange {
                index,
                count: dataset.partition_count(),
            })?;
        if let Some(stats) = partition.cached_stats() {
            return Ok(stats);
        }

        let columns: Vec<String> = dataset.schema().names().map(str::to_string).collect();
        let batch =
            self.reader
                .read_partition(partition, dataset.schema(), &columns, self.coercion_mode)?;
        let stats = Arc::new(PartitionStats::from_batch(&batch));
        partition.store_stats(Arc::clone(&stats));

        log_event(
            Event::StatsComputed,
            &[("path", partition.path().display().to_string().as_str())],
        );
        Ok(stats)
    }
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map_or(false, |n| n.starts_with('.') || n.starts_with('_'))
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

fn is_partition_file(path: &Path) -> bool {
    extension(path).as_deref() == Some(PARTITION_EXTENSION)
}

fn walk(
    dir: &Path,
    depth: usize,
    found: &mut Vec<(PathBuf, usize)>,
    foreign: &mut Vec<PathBuf>,
) -> CatalogResult<()> {
    let io_err = |e: std::io::Error| CatalogError::Io {
        path: dir.to_path_buf(),
        reason: e.to_string(),
    };
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_err)? {
        entries.push(entry.map_err(io_err)?.path());
    }
    entries.sort();

    for path in entries {
        if is_hidden(&path) {
            continue;
        }
        if path.is_dir() {
            walk(&path, depth + 1, found, foreign)?;
        } else if is_partition_file(&path) {
            found.push((path, depth));
        } else if extension(&path).map_or(false, |e| FOREIGN_EXTENSIONS.contains(&e.as_str())) {
            foreign.push(path);
        }
    }
    Ok(())
}

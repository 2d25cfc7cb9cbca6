//! Partition writer
//!
//! Writes one batch as one `.scol` file. The file is written to a
//! temporary sibling, fsynced, then renamed into place, so a reader never
//! observes a partially written partition under the final name.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::column::{Batch, ColumnData};

use super::checksum::compute_checksum;
use super::errors::{WriteError, WriteResult};
use super::layout::{ColumnEntry, PartitionHeader, PhysicalColumn, FORMAT_VERSION};

impl From<ColumnData> for PhysicalColumn {
    fn from(data: ColumnData) -> Self {
        match data {
            ColumnData::Int32(v) => PhysicalColumn::Int32(v),
            ColumnData::Int64(v) => PhysicalColumn::Int64(v),
            ColumnData::Float64(v) => PhysicalColumn::Float64(v),
            ColumnData::Utf8(v) => PhysicalColumn::Utf8(v),
            ColumnData::Bool(v) => PhysicalColumn::Bool(v),
            ColumnData::Date(v) => PhysicalColumn::Date32(v),
            ColumnData::Timestamp(v) => PhysicalColumn::TimestampMicros(v),
        }
    }
}

/// Stateless writer of partition files
#[derive(Debug, Clone, Copy, Default)]
pub struct PartitionWriter;

impl PartitionWriter {
    pub fn new() -> Self {
        Self
    }

    /// Writes a batch using the natural physical encoding of each column.
    ///
    /// Returns the number of bytes written.
    pub fn write(&self, path: &Path, batch: &Batch) -> WriteResult<u64> {
        let columns: Vec<(String, PhysicalColumn)> = batch
            .columns()
            .iter()
            .map(|c| (c.name().to_string(), PhysicalColumn::from(c.data().clone())))
            .collect();
        self.write_physical(path, batch.num_rows() as u64, &columns)
    }

    /// Writes explicitly encoded columns.
    ///
    /// Every column must hold exactly `row_count` values and names must be
    /// unique.
    pub fn write_physical(
        &self,
        path: &Path,
        row_count: u64,
        columns: &[(String, PhysicalColumn)],
    ) -> WriteResult<u64> {
        for (idx, (name, column)) in columns.iter().enumerate() {
            if column.len() as u64 != row_count {
                return Err(WriteError::InvalidBatch {
                    path: path.to_path_buf(),
                    reason: format!(
                        "column '{}' has {} values, expected {}",
                        name,
                        column.len(),
                        row_count
                    ),
                });
            }
            if columns[..idx].iter().any(|(other, _)| other == name) {
                return Err(WriteError::InvalidBatch {
                    path: path.to_path_buf(),
                    reason: format!("duplicate column '{}'", name),
                });
            }
        }

        let chunks: Vec<Vec<u8>> = columns.iter().map(|(_, c)| c.encode()).collect();
        let header_len =
            PartitionHeader::encoded_len(columns.iter().map(|(n, _)| n.as_str())) as u64;

        let mut offset = header_len;
        let mut entries = Vec::with_capacity(columns.len());
        for ((name, column), chunk) in columns.iter().zip(&chunks) {
            entries.push(ColumnEntry {
                name: name.clone(),
                physical_type: column.physical_type(),
                offset,
                length: chunk.len() as u64,
                checksum: compute_checksum(chunk),
            });
            offset += chunk.len() as u64;
        }
        let header = PartitionHeader {
            version: FORMAT_VERSION,
            row_count,
            columns: entries,
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| {
                    WriteError::io(parent, "failed to create partition directory", e)
                })?;
            }
        }

        let temp_path = temp_path_for(path);
        let mut file = File::create(&temp_path)
            .map_err(|e| WriteError::io(&temp_path, "failed to create temp file", e))?;
        file.write_all(&header.encode())
            .map_err(|e| WriteError::io(&temp_path, "failed to write header", e))?;
        for chunk in &chunks {
            file.write_all(chunk)
                .map_err(|e| WriteError::io(&temp_path, "failed to write column chunk", e))?;
        }
        file.sync_all()
            .map_err(|e| WriteError::io(&temp_path, "fsync failed", e))?;
        drop(file);

        fs::rename(&temp_path, path)
            .map_err(|e| WriteError::io(path, "failed to rename temp file", e))?;

        debug!(
            path = %path.display(),
            rows = row_count,
            columns = columns.len(),
            bytes = offset,
            "partition written"
        );
        Ok(offset)
    }
}

/// Hidden sibling so catalog enumeration never picks up an unfinished file
fn temp_path_for(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.tmp", file_name))
}

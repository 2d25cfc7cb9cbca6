//! Columnar reader with column pruning and corruption detection
//!
//! - Only the header and the requested column chunks are read
//! - Every chunk read is checksum-verified before decoding
//! - Decoded chunks are coerced to the dataset's logical schema
//! - One call reads one whole partition; nothing is cached between calls

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::trace;

use crate::catalog::PartitionDescriptor;
use crate::column::{Batch, ColumnBuffer};
use crate::schema::{CoercionMode, LogicalSchema, SchemaRegistry};

use super::checksum::verify_checksum;
use super::errors::{ReadError, ReadResult};
use super::layout::{PartitionHeader, PhysicalColumn};

/// Cumulative I/O performed through one reader
#[derive(Debug, Default)]
pub struct IoCounters {
    header_reads: AtomicU64,
    partition_reads: AtomicU64,
    chunk_reads: AtomicU64,
    bytes_read: AtomicU64,
}

/// Point-in-time copy of `IoCounters`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IoSnapshot {
    pub header_reads: u64,
    pub partition_reads: u64,
    pub chunk_reads: u64,
    pub bytes_read: u64,
}

impl IoSnapshot {
    /// True when no column data was touched
    pub fn no_data_reads(&self) -> bool {
        self.partition_reads == 0 && self.chunk_reads == 0
    }
}

impl IoCounters {
    pub fn snapshot(&self) -> IoSnapshot {
        IoSnapshot {
            header_reads: self.header_reads.load(Ordering::Relaxed),
            partition_reads: self.partition_reads.load(Ordering::Relaxed),
            chunk_reads: self.chunk_reads.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
        }
    }

    fn add_bytes(&self, bytes: u64) {
        self.bytes_read.fetch_add(bytes, Ordering::Relaxed);
    }
}

/// Tracks bytes of partition data currently held by executing workers
#[derive(Debug, Default)]
pub struct ResidencyTracker {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl ResidencyTracker {
    /// Registers `bytes` as resident until the returned guard drops
    pub fn track(self: &Arc<Self>, bytes: usize) -> ResidencyGuard {
        let now = self.current.fetch_add(bytes, Ordering::SeqCst) + bytes;
        self.peak.fetch_max(now, Ordering::SeqCst);
        ResidencyGuard {
            tracker: Arc::clone(self),
            bytes,
        }
    }

    pub fn current(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }

    /// Highest residency observed since creation or the last reset
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn reset_peak(&self) {
        self.peak.store(self.current(), Ordering::SeqCst);
    }
}

/// Releases tracked residency on drop
#[derive(Debug)]
pub struct ResidencyGuard {
    tracker: Arc<ResidencyTracker>,
    bytes: usize,
}

impl Drop for ResidencyGuard {
    fn drop(&mut self) {
        self.tracker.current.fetch_sub(self.bytes, Ordering::SeqCst);
    }
}

/// Reader for `.scol` partition files.
///
/// Cheap to clone; clones share counters and the residency tracker.
#[derive(Debug, Clone, Default)]
pub struct ColumnarReader {
    counters: Arc<IoCounters>,
    residency: Arc<ResidencyTracker>,
}

impl ColumnarReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counters(&self) -> &Arc<IoCounters> {
        &self.counters
    }

    pub fn residency(&self) -> &Arc<ResidencyTracker> {
        &self.residency
    }

    /// Reads only the header and column directory of a partition
    pub fn read_header(&self, path: &Path) -> ReadResult<PartitionHeader> {
        let mut reader = BufReader::new(File::open(path).map_err(|e| ReadError::io(path, e))?);
        let header =
            PartitionHeader::read_from(&mut reader).map_err(|reason| ReadError::corrupt(path, reason))?;
        self.counters.header_reads.fetch_add(1, Ordering::Relaxed);
        self.counters.add_bytes(
            PartitionHeader::encoded_len(header.columns.iter().map(|c| c.name.as_str())) as u64,
        );
        Ok(header)
    }

    /// Reads the requested columns of one partition, coerced to `schema`.
    ///
    /// `columns` must name columns of `schema`; an empty list yields a
    /// column-less batch that only carries the row count.
    pub fn read_partition(
        &self,
        partition: &PartitionDescriptor,
        schema: &LogicalSchema,
        columns: &[String],
        mode: CoercionMode,
    ) -> ReadResult<Batch> {
        let path = partition.path();
        let file = File::open(path).map_err(|e| ReadError::io(path, e))?;
        let file_len = file.metadata().map_err(|e| ReadError::io(path, e))?.len();
        let mut reader = BufReader::new(file);

        let header =
            PartitionHeader::read_from(&mut reader).map_err(|reason| ReadError::corrupt(path, reason))?;
        self.counters.partition_reads.fetch_add(1, Ordering::Relaxed);
        self.counters.add_bytes(
            PartitionHeader::encoded_len(header.columns.iter().map(|c| c.name.as_str())) as u64,
        );

        if header.row_count != partition.row_count() {
            return Err(ReadError::corrupt(
                path,
                format!(
                    "row count changed since open: header says {}, catalog says {}",
                    header.row_count,
                    partition.row_count()
                ),
            ));
        }
        let rows = usize::try_from(header.row_count)
            .map_err(|_| ReadError::corrupt(path, "row count exceeds address space"))?;

        let mut buffers = Vec::with_capacity(columns.len());
        for name in columns {
            if buffers.iter().any(|b: &ColumnBuffer| b.name() == name) {
                continue;
            }
            let field = schema.field(name).ok_or_else(|| {
                ReadError::corrupt_column(path, name.as_str(), "column is not part of the dataset schema")
            })?;
            let entry = header.column(name).ok_or_else(|| {
                ReadError::corrupt_column(path, name.as_str(), "column missing from partition")
            })?;

            let end = entry.offset.checked_add(entry.length);
            if end.map_or(true, |end| end > file_len) {
                return Err(ReadError::corrupt_column(
                    path,
                    name.as_str(),
                    format!(
                        "chunk [{}, +{}) extends past end of file ({} bytes)",
                        entry.offset, entry.length, file_len
                    ),
                ));
            }

            reader
                .seek(SeekFrom::Start(entry.offset))
                .map_err(|e| ReadError::io(path, e))?;
            let mut chunk = vec![0u8; entry.length as usize];
            reader
                .read_exact(&mut chunk)
                .map_err(|e| ReadError::corrupt_column(path, name.as_str(), format!("short read: {}", e)))?;
            self.counters.chunk_reads.fetch_add(1, Ordering::Relaxed);
            self.counters.add_bytes(entry.length);

            if !verify_checksum(&chunk, entry.checksum) {
                return Err(ReadError::corrupt_column(path, name.as_str(), "chunk checksum mismatch"));
            }
            let physical = PhysicalColumn::decode(entry.physical_type, rows, &chunk)
                .map_err(|reason| ReadError::corrupt_column(path, name.as_str(), reason))?;
            drop(chunk);

            let buffer = SchemaRegistry::coerce(name, physical, field.logical_type, mode).map_err(
                |source| ReadError::SchemaMismatch {
                    path: path.to_path_buf(),
                    source,
                },
            )?;
            buffers.push(buffer);
        }

        trace!(
            path = %path.display(),
            rows,
            columns = buffers.len(),
            "partition read"
        );
        Batch::with_row_count(buffers, rows)
            .map_err(|column| ReadError::corrupt_column(path, column, "decoded length differs from row count"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::{ColumnData, Scalar};
    use crate::schema::{LogicalType, RawSchemaSpec};
    use crate::storage::PartitionWriter;
    use tempfile::TempDir;

    fn write_sample(dir: &Path) -> PartitionDescriptor {
        let path = dir.join("p0.scol");
        let batch = Batch::try_new(vec![
            ColumnBuffer::new("id", ColumnData::Int32(vec![Some(1), Some(2), None])),
            ColumnBuffer::new(
                "name",
                ColumnData::Utf8(vec![Some("a".into()), Some("b".into()), Some("c".into())]),
            ),
        ])
        .unwrap();
        PartitionWriter::new().write(&path, &batch).unwrap();
        PartitionDescriptor::new(path, 3, 0)
    }

    fn schema() -> LogicalSchema {
        SchemaRegistry::bind(&RawSchemaSpec::new().column("id", "int64").column("name", "utf8"))
            .unwrap()
    }

    #[test]
    fn test_reads_only_requested_columns() {
        let dir = TempDir::new().unwrap();
        let partition = write_sample(dir.path());
        let reader = ColumnarReader::new();

        let batch = reader
            .read_partition(&partition, &schema(), &["id".to_string()], CoercionMode::Strict)
            .unwrap();
        assert_eq!(batch.num_columns(), 1);
        assert_eq!(batch.column("id").unwrap().logical_type(), LogicalType::Int64);
        assert_eq!(batch.row(1), vec![Scalar::Int64(2)]);

        let io = reader.counters().snapshot();
        assert_eq!(io.partition_reads, 1);
        assert_eq!(io.chunk_reads, 1);
    }

    #[test]
    fn test_zero_columns_keeps_row_count() {
        let dir = TempDir::new().unwrap();
        let partition = write_sample(dir.path());
        let batch = ColumnarReader::new()
            .read_partition(&partition, &schema(), &[], CoercionMode::Strict)
            .unwrap();
        assert_eq!(batch.num_rows(), 3);
        assert_eq!(batch.num_columns(), 0);
    }

    #[test]
    fn test_flipped_byte_in_chunk_is_corruption() {
        let dir = TempDir::new().unwrap();
        let partition = write_sample(dir.path());
        let mut bytes = std::fs::read(partition.path()).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x5a;
        std::fs::write(partition.path(), &bytes).unwrap();

        let err = ColumnarReader::new()
            .read_partition(&partition, &schema(), &["name".to_string()], CoercionMode::Strict)
            .unwrap_err();
        match err {
            ReadError::CorruptPartition { column, reason, .. } => {
                assert_eq!(column.as_deref(), Some("name"));
                assert!(reason.contains("checksum"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_truncated_file_is_corruption() {
        let dir = TempDir::new().unwrap();
        let partition = write_sample(dir.path());
        let bytes = std::fs::read(partition.path()).unwrap();
        std::fs::write(partition.path(), &bytes[..bytes.len() - 4]).unwrap();

        let err = ColumnarReader::new()
            .read_partition(&partition, &schema(), &["name".to_string()], CoercionMode::Strict)
            .unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn test_incompatible_schema_is_mismatch() {
        let dir = TempDir::new().unwrap();
        let partition = write_sample(dir.path());
        let schema =
            SchemaRegistry::bind(&RawSchemaSpec::new().column("id", "bool").column("name", "utf8"))
                .unwrap();
        let err = ColumnarReader::new()
            .read_partition(&partition, &schema, &["id".to_string()], CoercionMode::Strict)
            .unwrap_err();
        assert_eq!(err.code(), "STRATA_READ_SCHEMA_MISMATCH");
    }

    #[test]
    fn test_residency_guard_releases_on_drop() {
        let tracker = Arc::new(ResidencyTracker::default());
        {
            let _a = tracker.track(100);
            let _b = tracker.track(50);
            assert_eq!(tracker.current(), 150);
        }
        assert_eq!(tracker.current(), 0);
        assert_eq!(tracker.peak(), 150);
    }
}

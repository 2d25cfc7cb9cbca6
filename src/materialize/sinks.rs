//! Terminal sinks for in-memory and durable results

use std::path::{Path, PathBuf};

use crate::column::Batch;
use crate::executor::{BatchSink, SinkError, SinkState};
use crate::schema::LogicalSchema;
use crate::storage::{PartitionWriter, PARTITION_EXTENSION};

/// Keeps at most `max_rows` rows and notes whether more existed
#[derive(Debug)]
pub struct MemorySink {
    max_rows: usize,
    rows: usize,
    batches: Vec<Batch>,
    truncated: bool,
}

impl MemorySink {
    pub fn new(max_rows: usize) -> Self {
        Self {
            max_rows,
            rows: 0,
            batches: Vec::new(),
            truncated: false,
        }
    }

    pub fn num_rows(&self) -> usize {
        self.rows
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Collected rows as one batch, and the truncation flag
    pub fn into_parts(self, schema: &LogicalSchema) -> Result<(Batch, bool), SinkError> {
        let batch = Batch::concat(schema, self.batches)
            .map_err(|reason| SinkError::Rejected { reason })?;
        Ok((batch, self.truncated))
    }
}

impl BatchSink for MemorySink {
    fn push(&mut self, batch: Batch) -> Result<SinkState, SinkError> {
        if batch.is_empty() {
            return Ok(SinkState::NeedMore);
        }
        let room = self.max_rows - self.rows;
        if batch.num_rows() > room {
            self.truncated = true;
            let kept = batch.truncate(room);
            self.rows += kept.num_rows();
            if !kept.is_empty() {
                self.batches.push(kept);
            }
            return Ok(SinkState::Done);
        }
        self.rows += batch.num_rows();
        self.batches.push(batch);
        Ok(SinkState::NeedMore)
    }
}

/// File name of the `index`-th durable output partition
pub(crate) fn partition_file_name(index: usize) -> String {
    format!("part-{:05}.{}", index, PARTITION_EXTENSION)
}

/// Writes every batch as its own partition file under `dir`
#[derive(Debug)]
pub struct DurableSink {
    dir: PathBuf,
    writer: PartitionWriter,
    schema: Option<LogicalSchema>,
    partitions: Vec<PathBuf>,
    rows: u64,
    bytes: u64,
}

impl DurableSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            writer: PartitionWriter::new(),
            schema: None,
            partitions: Vec::new(),
            rows: 0,
            bytes: 0,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn partitions(&self) -> &[PathBuf] {
        &self.partitions
    }

    pub fn row_count(&self) -> u64 {
        self.rows
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes
    }

    fn write(&mut self, batch: &Batch) -> Result<(), SinkError> {
        let path = self.dir.join(partition_file_name(self.partitions.len()));
        self.bytes += self.writer.write(&path, batch)?;
        self.rows += batch.num_rows() as u64;
        self.partitions.push(path);
        Ok(())
    }
}

impl BatchSink for DurableSink {
    fn start(&mut self, schema: &LogicalSchema) -> Result<(), SinkError> {
        self.schema = Some(schema.clone());
        Ok(())
    }

    fn push(&mut self, batch: Batch) -> Result<SinkState, SinkError> {
        if !batch.is_empty() {
            self.write(&batch)?;
        }
        Ok(SinkState::NeedMore)
    }

    /// An empty result still gets one (empty) partition so it reopens
    /// as a dataset
    fn finish(&mut self) -> Result<(), SinkError> {
        if self.partitions.is_empty() {
            let schema = self.schema.clone().ok_or_else(|| SinkError::Rejected {
                reason: "finish called before start".to_string(),
            })?;
            self.write(&Batch::empty(&schema))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::{ColumnBuffer, ColumnData};

    fn batch(values: &[i64]) -> Batch {
        Batch::try_new(vec![ColumnBuffer::new(
            "v",
            ColumnData::Int64(values.iter().map(|v| Some(*v)).collect()),
        )])
        .unwrap()
    }

    #[test]
    fn test_memory_sink_truncates_mid_batch() {
        let mut sink = MemorySink::new(3);
        assert_eq!(sink.push(batch(&[1, 2])).unwrap(), SinkState::NeedMore);
        assert_eq!(sink.push(batch(&[3, 4])).unwrap(), SinkState::Done);
        assert!(sink.is_truncated());
        assert_eq!(sink.num_rows(), 3);
    }

    #[test]
    fn test_memory_sink_exact_fit_is_not_truncated() {
        let mut sink = MemorySink::new(2);
        assert_eq!(sink.push(batch(&[1, 2])).unwrap(), SinkState::NeedMore);
        assert_eq!(sink.push(batch(&[])).unwrap(), SinkState::NeedMore);
        assert!(!sink.is_truncated());
        assert_eq!(sink.push(batch(&[3])).unwrap(), SinkState::Done);
        assert!(sink.is_truncated());
    }

    #[test]
    fn test_durable_sink_names_partitions_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = DurableSink::new(dir.path());
        sink.start(&batch(&[]).schema()).unwrap();
        sink.push(batch(&[1])).unwrap();
        sink.push(batch(&[])).unwrap();
        sink.push(batch(&[2, 3])).unwrap();
        sink.finish().unwrap();
        let names: Vec<String> = sink
            .partitions()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["part-00000.scol", "part-00001.scol"]);
        assert_eq!(sink.row_count(), 3);
    }

    #[test]
    fn test_durable_sink_writes_empty_partition_for_empty_result() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = DurableSink::new(dir.path());
        sink.start(&batch(&[]).schema()).unwrap();
        sink.finish().unwrap();
        assert_eq!(sink.partitions().len(), 1);
        assert_eq!(sink.row_count(), 0);
    }
}

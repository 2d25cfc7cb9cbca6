//! Result sinks
//!
//! The engine pushes output batches into a sink in output order. A sink
//! that has seen enough answers `Done` and the engine stops reading.

use crate::column::Batch;
use crate::schema::LogicalSchema;

use super::errors::SinkError;

/// Whether a sink wants more rows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkState {
    NeedMore,
    Done,
}

/// Consumer of a query's output batches
pub trait BatchSink {
    /// Called once before the first batch with the output schema
    fn start(&mut self, _schema: &LogicalSchema) -> Result<(), SinkError> {
        Ok(())
    }

    fn push(&mut self, batch: Batch) -> Result<SinkState, SinkError>;

    /// Called once after the last batch unless execution failed
    fn finish(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Collects every batch; used by tests and by the bridge
#[derive(Debug, Default)]
pub struct CollectSink {
    pub batches: Vec<Batch>,
}

impl CollectSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(Batch::num_rows).sum()
    }

    /// All collected rows as one batch
    pub fn into_batch(self, schema: &LogicalSchema) -> Result<Batch, SinkError> {
        Batch::concat(schema, self.batches).map_err(|reason| SinkError::Rejected { reason })
    }
}

impl BatchSink for CollectSink {
    fn push(&mut self, batch: Batch) -> Result<SinkState, SinkError> {
        if !batch.is_empty() {
            self.batches.push(batch);
        }
        Ok(SinkState::NeedMore)
    }
}

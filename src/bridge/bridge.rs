//! Hand-off between the primary and secondary engines

use std::sync::Arc;

use crate::column::Batch;
use crate::executor::{BatchSink, ExecResult, ExecStats, ExecutionEngine, SinkState};
use crate::observability::{log_event, Event};
use crate::planner::{PlanNode, QueryPlan};

use super::errors::BridgeError;
use super::row_engine::{Row, SecondaryEngine};
use super::translate::RowPlan;

/// Rows per batch when converting secondary output back to columns
const OUTPUT_BATCH_ROWS: usize = 4096;

/// Runs secondary-owned plans on the in-memory row engine.
///
/// The supported prefix under each `BridgeOut` still runs out of core on
/// the primary engine; only its output is held in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecondaryBridge {
    secondary_max_rows: usize,
}

impl SecondaryBridge {
    pub fn new(secondary_max_rows: usize) -> Self {
        Self { secondary_max_rows }
    }

    /// Maximum rows any single secondary input may hold
    pub fn secondary_max_rows(&self) -> usize {
        self.secondary_max_rows
    }

    /// Executes a secondary-owned plan, delegating its prefix to `engine`
    pub fn delegate(
        &self,
        engine: &ExecutionEngine,
        plan: &QueryPlan,
        sink: &mut dyn BatchSink,
    ) -> ExecResult<ExecStats> {
        sink.start(plan.schema())?;
        let stats = self.run(engine, plan.root(), false, sink)?;
        sink.finish()?;
        Ok(stats)
    }

    /// Executes the entire plan on the secondary engine, whatever its
    /// ownership
    pub fn delegate_whole(
        &self,
        engine: &ExecutionEngine,
        plan: &QueryPlan,
        sink: &mut dyn BatchSink,
    ) -> ExecResult<ExecStats> {
        sink.start(plan.schema())?;
        let stats = self.run(engine, plan.root(), true, sink)?;
        sink.finish()?;
        Ok(stats)
    }

    /// Translates and runs the subtree at `node` without starting or
    /// finishing the sink
    pub(crate) fn run(
        &self,
        engine: &ExecutionEngine,
        node: &Arc<PlanNode>,
        whole: bool,
        sink: &mut dyn BatchSink,
    ) -> ExecResult<ExecStats> {
        let plan = RowPlan::translate(node, whole)?;
        log_event(
            Event::BridgeDelegated,
            &[
                ("root", node.kind().name()),
                ("sources", plan.source_count().to_string().as_str()),
                ("whole", if whole { "true" } else { "false" }),
            ],
        );

        let mut secondary = SecondaryEngine::new(engine, self.secondary_max_rows);
        let rows = secondary.run(plan)?;
        let mut stats = secondary.stats;
        emit_rows(node, rows, sink, &mut stats)?;
        Ok(stats)
    }
}

/// Converts rows back to batches with exactly the node's output schema
fn emit_rows(
    node: &PlanNode,
    rows: Vec<Row>,
    sink: &mut dyn BatchSink,
    stats: &mut ExecStats,
) -> ExecResult<()> {
    let mut rows = rows.into_iter().peekable();
    while rows.peek().is_some() {
        let chunk: Vec<Row> = rows.by_ref().take(OUTPUT_BATCH_ROWS).collect();
        let batch = Batch::from_rows(node.schema(), chunk).map_err(|column| {
            BridgeError::incompatible(format!(
                "value in column {} does not fit the declared output type",
                column
            ))
        })?;
        stats.rows_emitted += batch.num_rows() as u64;
        if sink.push(batch)? == SinkState::Done {
            break;
        }
    }
    Ok(())
}

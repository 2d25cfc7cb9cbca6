//! Out-of-core execution of primary-owned plans
//!
//! A primary plan is a chain over one scan. It runs in three phases:
//!
//! 1. streaming: every partition is read, filtered and projected on its
//!    own, in waves of `workers` partitions on the rayon pool
//! 2. blocking: the first aggregate, sort or limit consumes the stream
//! 3. tail: nodes above the blocking node run on its (bounded) output
//!
//! Wave results are consumed in partition order, so output order and
//! aggregate merge order never depend on scheduling.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::warn;

use crate::bridge::SecondaryBridge;
use crate::catalog::{DatasetHandle, PartitionDescriptor};
use crate::column::{Batch, ColumnBuffer, CompareOp, Scalar};
use crate::config::{ConfigError, ConfigResult, CorruptPartitionPolicy, EngineConfig};
use crate::observability::{log_event, Event};
use crate::planner::{Engine, NodeKind, PlanNode, QueryPlan, SortKey};
use crate::schema::LogicalSchema;
use crate::storage::{ColumnarReader, ReadError, ResidencyGuard};

use super::aggregate::{AggregateInputs, GroupTable};
use super::cancel::CancellationToken;
use super::errors::{ExecError, ExecResult};
use super::eval::PhysicalExpr;
use super::sink::{BatchSink, SinkState};
use super::sorter::{sort_batch, TopK};

/// Counters reported for every execution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecStats {
    pub partitions_read: usize,
    pub partitions_skipped: usize,
    pub partitions_pruned: usize,
    pub rows_scanned: u64,
    pub rows_emitted: u64,
    /// True if any part of the plan ran on the secondary engine
    pub delegated: bool,
}

impl ExecStats {
    /// Partitions the engine is finished with, whatever the outcome
    pub fn partitions_completed(&self) -> usize {
        self.partitions_read + self.partitions_skipped + self.partitions_pruned
    }

    /// Adds the scan counters of a sub-execution
    pub(crate) fn absorb(&mut self, other: &ExecStats) {
        self.partitions_read += other.partitions_read;
        self.partitions_skipped += other.partitions_skipped;
        self.partitions_pruned += other.partitions_pruned;
        self.rows_scanned += other.rows_scanned;
        self.delegated |= other.delegated;
    }
}

#[derive(Debug)]
enum StreamOp {
    Filter(PhysicalExpr),
    Project(Vec<(String, PhysicalExpr)>),
}

#[derive(Debug)]
enum Blocking {
    Aggregate {
        inputs: AggregateInputs,
        template: GroupTable,
    },
    Sort {
        keys: Vec<SortKey>,
    },
    TopK {
        keys: Vec<SortKey>,
        k: usize,
    },
    Limit(usize),
}

/// Compiled form of a primary chain
struct Pipeline<'a> {
    dataset: &'a DatasetHandle,
    columns: &'a [String],
    stream: Vec<StreamOp>,
    pruning: Vec<(String, CompareOp, Scalar)>,
    blocking: Option<Blocking>,
    tail: Vec<&'a PlanNode>,
}

enum Outcome {
    Cancelled,
    Pruned,
    Skipped(ReadError),
    Rows {
        batch: Batch,
        rows_scanned: u64,
        _residency: ResidencyGuard,
    },
    Partial {
        table: GroupTable,
        rows_scanned: u64,
    },
    Merged {
        rows_scanned: u64,
    },
}

/// Consumer-side state of the blocking node
enum Accumulator {
    Stream,
    Aggregate(GroupTable),
    Sort { batches: Vec<Batch>, rows: usize },
    TopK(TopK),
    Limit { batches: Vec<Batch>, remaining: usize },
}

/// Streaming executor over partitioned datasets.
///
/// Cheap to clone; clones share the worker pool, the reader counters and
/// the cancellation token.
#[derive(Clone)]
pub struct ExecutionEngine {
    pool: Arc<ThreadPool>,
    config: EngineConfig,
    reader: ColumnarReader,
    token: CancellationToken,
    bridge: SecondaryBridge,
}

impl fmt::Debug for ExecutionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionEngine")
            .field("num_threads", &self.pool.current_num_threads())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ExecutionEngine {
    pub fn new(config: EngineConfig, reader: ColumnarReader) -> ConfigResult<Self> {
        config.validate()?;
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.workers)
            .thread_name(|idx| format!("strata-worker-{idx}"))
            .build()
            .map_err(|e| ConfigError::invalid("engine.workers", e.to_string()))?;
        let bridge = SecondaryBridge::new(config.secondary_max_rows);
        Ok(Self {
            pool: Arc::new(pool),
            config,
            reader,
            token: CancellationToken::new(),
            bridge,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn reader(&self) -> &ColumnarReader {
        &self.reader
    }

    pub fn bridge(&self) -> &SecondaryBridge {
        &self.bridge
    }

    /// Token observed by every query of this engine
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.token
    }

    /// Runs `plan`, pushing its output into `sink` in output order
    pub fn execute(&self, plan: &QueryPlan, sink: &mut dyn BatchSink) -> ExecResult<ExecStats> {
        let started = Instant::now();
        log_event(
            Event::QueryStarted,
            &[
                ("root", plan.root().kind().name()),
                ("engine", plan.engine().as_str()),
                ("estimated_rows", plan.estimated_rows().to_string().as_str()),
            ],
        );

        let result = sink
            .start(plan.schema())
            .map_err(ExecError::from)
            .and_then(|_| self.run_node(plan.root(), sink))
            .and_then(|stats| {
                sink.finish()?;
                Ok(stats)
            });

        self.log_outcome(&result, started);
        result
    }

    /// Runs the entire plan on the secondary engine
    pub fn execute_secondary(
        &self,
        plan: &QueryPlan,
        sink: &mut dyn BatchSink,
    ) -> ExecResult<ExecStats> {
        let started = Instant::now();
        let result = sink
            .start(plan.schema())
            .map_err(ExecError::from)
            .and_then(|_| self.bridge.run(self, plan.root(), true, sink))
            .and_then(|stats| {
                sink.finish()?;
                Ok(stats)
            });
        self.log_outcome(&result, started);
        result
    }

    fn log_outcome(&self, result: &ExecResult<ExecStats>, started: Instant) {
        let elapsed_ms = started.elapsed().as_millis().to_string();
        match result {
            Ok(stats) => log_event(
                Event::QueryCompleted,
                &[
                    ("partitions_read", stats.partitions_read.to_string().as_str()),
                    ("partitions_skipped", stats.partitions_skipped.to_string().as_str()),
                    ("partitions_pruned", stats.partitions_pruned.to_string().as_str()),
                    ("rows_scanned", stats.rows_scanned.to_string().as_str()),
                    ("rows_emitted", stats.rows_emitted.to_string().as_str()),
                    ("elapsed_ms", elapsed_ms.as_str()),
                ],
            ),
            Err(ExecError::Cancelled {
                partitions_completed,
            }) => log_event(
                Event::QueryCancelled,
                &[
                    ("partitions_completed", partitions_completed.to_string().as_str()),
                    ("elapsed_ms", elapsed_ms.as_str()),
                ],
            ),
            Err(e) => warn!(code = e.code(), error = %e, "query failed"),
        }
    }

    /// Runs the subtree rooted at `node` without sink start/finish calls
    pub(crate) fn run_node(
        &self,
        node: &Arc<PlanNode>,
        sink: &mut dyn BatchSink,
    ) -> ExecResult<ExecStats> {
        match node.engine() {
            Engine::Secondary => self.bridge.run(self, node, false, sink),
            Engine::Primary => self.run_primary(node, sink),
        }
    }

    fn cancelled(&self, stats: &ExecStats) -> ExecError {
        ExecError::Cancelled {
            partitions_completed: stats.partitions_completed(),
        }
    }

    /// Reads one partition of a scan, applying the corrupt-partition
    /// policy. `Ok(Err(_))` means the partition is skipped.
    pub(crate) fn read_scan_partition(
        &self,
        dataset: &DatasetHandle,
        partition: &PartitionDescriptor,
        columns: &[String],
    ) -> ExecResult<Result<Batch, ReadError>> {
        match self.reader.read_partition(
            partition,
            dataset.schema(),
            columns,
            self.config.coercion_mode,
        ) {
            Ok(batch) => Ok(Ok(batch)),
            Err(e)
                if e.is_corruption()
                    && self.config.on_corrupt_partition == CorruptPartitionPolicy::Skip =>
            {
                Ok(Err(e))
            }
            Err(e) => Err(ExecError::Aborted {
                path: partition.path().to_path_buf(),
                source: e,
            }),
        }
    }

    pub(crate) fn log_skipped(err: &ReadError) {
        log_event(
            Event::PartitionSkipped,
            &[
                ("path", err.path().display().to_string().as_str()),
                ("reason", err.to_string().as_str()),
            ],
        );
    }

    fn run_primary(&self, root: &Arc<PlanNode>, sink: &mut dyn BatchSink) -> ExecResult<ExecStats> {
        let pipeline = self.compile(root)?;
        let mut stats = ExecStats::default();
        let mut acc = match &pipeline.blocking {
            None => Accumulator::Stream,
            Some(Blocking::Aggregate { template, .. }) => Accumulator::Aggregate(template.empty_like()),
            Some(Blocking::Sort { .. }) => Accumulator::Sort {
                batches: Vec::new(),
                rows: 0,
            },
            Some(Blocking::TopK { keys, k }) => Accumulator::TopK(TopK::new(keys.clone(), *k)),
            Some(Blocking::Limit(n)) => Accumulator::Limit {
                batches: Vec::new(),
                remaining: *n,
            },
        };
        let shared = match (&pipeline.blocking, self.config.deterministic_merge) {
            (Some(Blocking::Aggregate { template, .. }), false) => {
                Some(Mutex::new(template.empty_like()))
            }
            _ => None,
        };

        let mut done = matches!(acc, Accumulator::Limit { remaining: 0, .. });
        for wave in pipeline.dataset.partitions().chunks(self.config.workers) {
            if done {
                break;
            }
            if self.token.is_cancelled() {
                return Err(self.cancelled(&stats));
            }

            let outcomes: Vec<ExecResult<Outcome>> = self.pool.install(|| {
                wave.par_iter()
                    .map(|partition| self.process_partition(&pipeline, partition, shared.as_ref()))
                    .collect()
            });

            for outcome in outcomes {
                if done {
                    break;
                }
                match outcome? {
                    Outcome::Cancelled => return Err(self.cancelled(&stats)),
                    Outcome::Pruned => stats.partitions_pruned += 1,
                    Outcome::Skipped(err) => {
                        Self::log_skipped(&err);
                        stats.partitions_skipped += 1;
                    }
                    Outcome::Merged { rows_scanned } => {
                        stats.partitions_read += 1;
                        stats.rows_scanned += rows_scanned;
                    }
                    Outcome::Partial {
                        table,
                        rows_scanned,
                    } => {
                        stats.partitions_read += 1;
                        stats.rows_scanned += rows_scanned;
                        if let Accumulator::Aggregate(acc) = &mut acc {
                            acc.merge(table)?;
                        }
                    }
                    Outcome::Rows {
                        batch,
                        rows_scanned,
                        _residency,
                    } => {
                        stats.partitions_read += 1;
                        stats.rows_scanned += rows_scanned;
                        done = self.consume(&mut acc, batch, sink, &mut stats)?;
                    }
                }
            }
        }

        if let Some(shared) = shared {
            if let Accumulator::Aggregate(acc) = &mut acc {
                acc.merge(shared.into_inner())?;
            }
        }

        let output = match acc {
            Accumulator::Stream => return Ok(stats),
            Accumulator::Aggregate(table) => table.finish()?,
            Accumulator::Sort { batches, rows } => {
                self.check_sort_budget(rows)?;
                if batches.is_empty() {
                    return self.emit_empty(&pipeline, root, sink, stats);
                }
                let keys = match &pipeline.blocking {
                    Some(Blocking::Sort { keys }) => keys.as_slice(),
                    _ => &[],
                };
                sort_batch(concat(batches)?, keys, None)?
            }
            Accumulator::TopK(top) => match top.finish() {
                Some(batch) => batch,
                None => return self.emit_empty(&pipeline, root, sink, stats),
            },
            Accumulator::Limit { batches, .. } => {
                if batches.is_empty() {
                    return self.emit_empty(&pipeline, root, sink, stats);
                }
                concat(batches)?
            }
        };

        let output = self.run_tail(&pipeline.tail, output)?;
        self.emit(output, sink, &mut stats)?;
        Ok(stats)
    }

    /// Tail nodes over an empty blocking result still shape the output
    fn emit_empty(
        &self,
        pipeline: &Pipeline<'_>,
        root: &Arc<PlanNode>,
        sink: &mut dyn BatchSink,
        mut stats: ExecStats,
    ) -> ExecResult<ExecStats> {
        let input_schema = match pipeline.tail.first() {
            Some(first) => first
                .inputs()
                .first()
                .map(|n| n.schema().clone())
                .unwrap_or_else(|| root.schema().clone()),
            None => root.schema().clone(),
        };
        let output = self.run_tail(&pipeline.tail, Batch::empty(&input_schema))?;
        self.emit(output, sink, &mut stats)?;
        Ok(stats)
    }

    fn emit(&self, batch: Batch, sink: &mut dyn BatchSink, stats: &mut ExecStats) -> ExecResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        stats.rows_emitted += batch.num_rows() as u64;
        sink.push(batch)?;
        Ok(())
    }

    /// Feeds one partition's streamed output to the accumulator.
    /// Returns true when no further partitions are needed.
    fn consume(
        &self,
        acc: &mut Accumulator,
        batch: Batch,
        sink: &mut dyn BatchSink,
        stats: &mut ExecStats,
    ) -> ExecResult<bool> {
        match acc {
            Accumulator::Stream => {
                if batch.is_empty() {
                    return Ok(false);
                }
                stats.rows_emitted += batch.num_rows() as u64;
                Ok(sink.push(batch)? == SinkState::Done)
            }
            Accumulator::Sort { batches, rows } => {
                *rows += batch.num_rows();
                self.check_sort_budget(*rows)?;
                if !batch.is_empty() {
                    batches.push(batch);
                }
                Ok(false)
            }
            Accumulator::TopK(top) => {
                top.push(batch)?;
                Ok(false)
            }
            Accumulator::Limit { batches, remaining } => {
                let batch = batch.truncate(*remaining);
                *remaining -= batch.num_rows();
                if !batch.is_empty() {
                    batches.push(batch);
                }
                Ok(*remaining == 0)
            }
            Accumulator::Aggregate(_) => Ok(false),
        }
    }

    fn check_sort_budget(&self, rows: usize) -> ExecResult<()> {
        if rows > self.config.max_sort_rows {
            return Err(ExecError::SortBudgetExceeded {
                rows,
                limit: self.config.max_sort_rows,
            });
        }
        Ok(())
    }

    /// Worker-side processing of one partition
    fn process_partition(
        &self,
        pipeline: &Pipeline<'_>,
        partition: &PartitionDescriptor,
        shared: Option<&Mutex<GroupTable>>,
    ) -> ExecResult<Outcome> {
        if self.token.is_cancelled() {
            return Ok(Outcome::Cancelled);
        }
        if is_pruned(partition, &pipeline.pruning) {
            log_event(
                Event::PartitionPruned,
                &[("path", partition.path().display().to_string().as_str())],
            );
            return Ok(Outcome::Pruned);
        }

        let batch = match self.read_scan_partition(pipeline.dataset, partition, pipeline.columns)? {
            Ok(batch) => batch,
            Err(err) => return Ok(Outcome::Skipped(err)),
        };
        let residency = self.reader.residency().track(batch.byte_size());
        let rows_scanned = batch.num_rows() as u64;
        let batch = apply_stream(&pipeline.stream, batch)?;

        match &pipeline.blocking {
            Some(Blocking::Aggregate { inputs, template }) => {
                let mut partial = template.empty_like();
                inputs.accumulate_batch(&mut partial, &batch)?;
                drop(batch);
                drop(residency);
                match shared {
                    Some(shared) => {
                        shared.lock().merge(partial)?;
                        Ok(Outcome::Merged { rows_scanned })
                    }
                    None => Ok(Outcome::Partial {
                        table: partial,
                        rows_scanned,
                    }),
                }
            }
            _ => Ok(Outcome::Rows {
                batch,
                rows_scanned,
                _residency: residency,
            }),
        }
    }

    /// Splits a primary chain into scan, streaming ops, blocking node and tail
    fn compile<'a>(&self, root: &'a Arc<PlanNode>) -> ExecResult<Pipeline<'a>> {
        let mut chain: Vec<&'a PlanNode> = Vec::new();
        let mut current: &'a PlanNode = root;
        let (dataset, columns) = loop {
            if current.engine() != Engine::Primary {
                return Err(ExecError::UnsupportedOnPrimary {
                    construct: format!("{} owned by the secondary engine", current.kind().name()),
                });
            }
            match current.kind() {
                NodeKind::Scan { dataset, columns } => break (dataset, columns.as_slice()),
                NodeKind::Join { .. } | NodeKind::BridgeOut { .. } => {
                    return Err(ExecError::UnsupportedOnPrimary {
                        construct: current.kind().name().to_string(),
                    })
                }
                _ => {
                    chain.push(current);
                    match current.inputs().first().copied() {
                        Some(input) => current = input,
                        None => {
                            return Err(ExecError::UnsupportedOnPrimary {
                                construct: format!("{} without input", current.kind().name()),
                            })
                        }
                    }
                }
            }
        };
        chain.reverse();

        let mut stream = Vec::new();
        let mut pruning = Vec::new();
        let mut projected = false;
        let mut blocking = None;
        let mut tail = Vec::new();
        for node in chain {
            if blocking.is_some() {
                tail.push(node);
                continue;
            }
            let input_schema = input_schema(node)?;
            match node.kind() {
                NodeKind::Filter { predicate, .. } => {
                    if !projected {
                        for conjunct in predicate.conjuncts() {
                            if let Some((column, op, value)) = conjunct.as_column_comparison() {
                                if !value.is_null() {
                                    pruning.push((column.to_string(), op, value.clone()));
                                }
                            }
                        }
                    }
                    stream.push(StreamOp::Filter(PhysicalExpr::compile(predicate, input_schema)?));
                }
                NodeKind::Project { exprs, .. } => {
                    projected = true;
                    let compiled = exprs
                        .iter()
                        .map(|e| Ok((e.name.clone(), PhysicalExpr::compile(&e.expr, input_schema)?)))
                        .collect::<ExecResult<Vec<_>>>()?;
                    stream.push(StreamOp::Project(compiled));
                }
                NodeKind::Aggregate {
                    group_by,
                    aggregates,
                    ..
                } => {
                    blocking = Some(Blocking::Aggregate {
                        inputs: AggregateInputs::compile(input_schema, group_by, aggregates)?,
                        template: GroupTable::new(
                            node.schema().clone(),
                            group_by.len(),
                            aggregates,
                            self.config.max_groups,
                        ),
                    });
                }
                NodeKind::Sort {
                    keys,
                    fetch: Some(k),
                    ..
                } => {
                    blocking = Some(Blocking::TopK {
                        keys: keys.clone(),
                        k: *k,
                    })
                }
                NodeKind::Sort { keys, fetch: None, .. } => {
                    blocking = Some(Blocking::Sort { keys: keys.clone() })
                }
                NodeKind::Limit { n, .. } => blocking = Some(Blocking::Limit(*n)),
                NodeKind::Scan { .. } | NodeKind::Join { .. } | NodeKind::BridgeOut { .. } => {
                    return Err(ExecError::UnsupportedOnPrimary {
                        construct: node.kind().name().to_string(),
                    })
                }
            }
        }

        Ok(Pipeline {
            dataset,
            columns,
            stream,
            pruning,
            blocking,
            tail,
        })
    }

    /// Runs nodes above the blocking node on its in-memory output
    fn run_tail(&self, tail: &[&PlanNode], mut batch: Batch) -> ExecResult<Batch> {
        for node in tail {
            let input_schema = input_schema(node)?;
            batch = match node.kind() {
                NodeKind::Filter { predicate, .. } => {
                    let mask = PhysicalExpr::compile(predicate, input_schema)?.eval_mask(&batch)?;
                    batch.filter(&mask)
                }
                NodeKind::Project { exprs, .. } => {
                    let compiled = exprs
                        .iter()
                        .map(|e| Ok((e.name.clone(), PhysicalExpr::compile(&e.expr, input_schema)?)))
                        .collect::<ExecResult<Vec<_>>>()?;
                    apply_stream(&[StreamOp::Project(compiled)], batch)?
                }
                NodeKind::Aggregate {
                    group_by,
                    aggregates,
                    ..
                } => {
                    let inputs = AggregateInputs::compile(input_schema, group_by, aggregates)?;
                    let mut table = GroupTable::new(
                        node.schema().clone(),
                        group_by.len(),
                        aggregates,
                        self.config.max_groups,
                    );
                    inputs.accumulate_batch(&mut table, &batch)?;
                    table.finish()?
                }
                NodeKind::Sort { keys, fetch, .. } => {
                    if fetch.is_none() {
                        self.check_sort_budget(batch.num_rows())?;
                    }
                    sort_batch(batch, keys, *fetch)?
                }
                NodeKind::Limit { n, .. } => batch.truncate(*n),
                NodeKind::Scan { .. } | NodeKind::Join { .. } | NodeKind::BridgeOut { .. } => {
                    return Err(ExecError::UnsupportedOnPrimary {
                        construct: node.kind().name().to_string(),
                    })
                }
            };
        }
        Ok(batch)
    }
}

fn input_schema(node: &PlanNode) -> ExecResult<&LogicalSchema> {
    node.inputs()
        .first()
        .copied()
        .map(|input| input.schema())
        .ok_or_else(|| ExecError::UnsupportedOnPrimary {
            construct: format!("{} without input", node.kind().name()),
        })
}

/// Concatenates non-empty partition outputs
fn concat(batches: Vec<Batch>) -> ExecResult<Batch> {
    let schema = match batches.first() {
        Some(first) => first.schema(),
        None => return Err(ExecError::invalid_value("partition output", "no batches")),
    };
    Batch::concat(&schema, batches).map_err(|reason| ExecError::invalid_value("partition output", reason))
}

fn apply_stream(ops: &[StreamOp], mut batch: Batch) -> ExecResult<Batch> {
    for op in ops {
        batch = match op {
            StreamOp::Filter(predicate) => {
                let mask = predicate.eval_mask(&batch)?;
                batch.filter(&mask)
            }
            StreamOp::Project(exprs) => {
                let rows = batch.num_rows();
                let columns = exprs
                    .iter()
                    .map(|(name, expr)| Ok(ColumnBuffer::new(name.clone(), expr.eval(&batch)?)))
                    .collect::<ExecResult<Vec<_>>>()?;
                Batch::with_row_count(columns, rows)
                    .map_err(|column| ExecError::invalid_value(column, "projection length mismatch"))?
            }
        };
    }
    Ok(batch)
}

/// True if cached statistics prove no row can pass the pushed filters.
/// Statistics are never computed here.
fn is_pruned(partition: &PartitionDescriptor, pruning: &[(String, CompareOp, Scalar)]) -> bool {
    let Some(stats) = partition.cached_stats() else {
        return false;
    };
    pruning.iter().any(|(column, op, value)| {
        stats
            .column(column)
            .map_or(false, |c| !c.may_satisfy(*op, value))
    })
}

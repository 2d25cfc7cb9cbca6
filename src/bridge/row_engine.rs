//! Secondary row engine
//!
//! An in-memory interpreter over `Vec<Scalar>` rows. It supports every plan
//! node and expression, including hash joins and unbounded sorts, but holds
//! its whole input in memory. Each source and each join output is
//! therefore capped at `secondary_max_rows`.

use hashbrown::HashMap;

use crate::column::{Batch, Scalar, ScalarKey};
use crate::executor::{
    BatchSink, ExecError, ExecResult, ExecStats, ExecutionEngine, SinkError, SinkState,
};
use crate::schema::LogicalType;

use super::errors::BridgeError;
use super::translate::{RowPlan, RowSource};

pub(crate) type Row = Vec<Scalar>;

/// Converts a batch into rows
pub(crate) fn batch_rows(batch: &Batch) -> Vec<Row> {
    (0..batch.num_rows()).map(|i| batch.row(i)).collect()
}

/// Sink collecting a primary prefix as rows, bounded by `max_rows`
struct RowCollector {
    rows: Vec<Row>,
    max_rows: usize,
    overflowed: bool,
}

impl BatchSink for RowCollector {
    fn push(&mut self, batch: Batch) -> Result<SinkState, SinkError> {
        if self.rows.len() + batch.num_rows() > self.max_rows {
            self.overflowed = true;
            return Ok(SinkState::Done);
        }
        self.rows.extend(batch_rows(&batch));
        Ok(SinkState::NeedMore)
    }
}

/// Interpreter for one delegated plan
pub(crate) struct SecondaryEngine<'a> {
    engine: &'a ExecutionEngine,
    max_rows: usize,
    pub(crate) stats: ExecStats,
}

impl<'a> SecondaryEngine<'a> {
    pub(crate) fn new(engine: &'a ExecutionEngine, max_rows: usize) -> Self {
        Self {
            engine,
            max_rows,
            stats: ExecStats {
                delegated: true,
                ..ExecStats::default()
            },
        }
    }

    pub(crate) fn run(&mut self, plan: RowPlan) -> ExecResult<Vec<Row>> {
        match plan {
            RowPlan::Source(source) => self.read_source(source),
            RowPlan::Filter { input, predicate } => {
                let mut rows = self.run(*input)?;
                rows.retain(|row| predicate.eval_row(row).as_bool() == Some(true));
                Ok(rows)
            }
            RowPlan::Project { input, exprs } => {
                let rows = self.run(*input)?;
                Ok(rows
                    .iter()
                    .map(|row| exprs.iter().map(|e| e.eval_row(row)).collect())
                    .collect())
            }
            RowPlan::Aggregate {
                input,
                inputs,
                mut table,
            } => {
                for row in self.run(*input)? {
                    inputs.accumulate_row(&mut table, &row)?;
                }
                Ok(batch_rows(&table.finish()?))
            }
            RowPlan::Sort { input, keys, fetch } => {
                let mut rows = self.run(*input)?;
                rows.sort_by(|a, b| keys.compare_rows(a, b));
                if let Some(n) = fetch {
                    rows.truncate(n);
                }
                Ok(rows)
            }
            RowPlan::Limit { input, n } => {
                let mut rows = self.run(*input)?;
                rows.truncate(n);
                Ok(rows)
            }
            RowPlan::Join {
                left,
                right,
                left_keys,
                right_keys,
                key_types,
            } => {
                let left = self.run(*left)?;
                let right = self.run(*right)?;
                hash_join(&left, &right, &left_keys, &right_keys, &key_types, self.max_rows)
            }
        }
    }

    fn over_budget(&self) -> ExecError {
        BridgeError::incompatible(format!("secondary input exceeds {} rows", self.max_rows)).into()
    }

    fn read_source(&mut self, source: RowSource) -> ExecResult<Vec<Row>> {
        match source {
            RowSource::Primary(node) => {
                let mut collector = RowCollector {
                    rows: Vec::new(),
                    max_rows: self.max_rows,
                    overflowed: false,
                };
                let stats = self.engine.run_node(&node, &mut collector).map_err(|e| match e {
                    ExecError::Cancelled { .. } | ExecError::Bridge(_) => e,
                    other => BridgeError::incompatible(format!("primary prefix failed: {}", other))
                        .into(),
                })?;
                self.stats.absorb(&stats);
                if collector.overflowed {
                    return Err(self.over_budget());
                }
                Ok(collector.rows)
            }
            RowSource::Scan { dataset, columns } => {
                let mut rows = Vec::new();
                for partition in dataset.partitions() {
                    if self.engine.cancellation_token().is_cancelled() {
                        return Err(ExecError::Cancelled {
                            partitions_completed: self.stats.partitions_completed(),
                        });
                    }
                    match self.engine.read_scan_partition(&dataset, partition, &columns)? {
                        Ok(batch) => {
                            self.stats.partitions_read += 1;
                            self.stats.rows_scanned += batch.num_rows() as u64;
                            if rows.len() + batch.num_rows() > self.max_rows {
                                return Err(self.over_budget());
                            }
                            rows.extend(batch_rows(&batch));
                        }
                        Err(err) => {
                            ExecutionEngine::log_skipped(&err);
                            self.stats.partitions_skipped += 1;
                        }
                    }
                }
                Ok(rows)
            }
        }
    }
}

/// Inner equi-join. Output follows left row order, then right row order
/// within each key. Rows with a null key never match. Fails once the
/// output would exceed `max_rows`.
fn hash_join(
    left: &[Row],
    right: &[Row],
    left_keys: &[usize],
    right_keys: &[usize],
    key_types: &[(LogicalType, LogicalType)],
    max_rows: usize,
) -> ExecResult<Vec<Row>> {
    let mut table: HashMap<Vec<ScalarKey>, Vec<usize>> = HashMap::new();
    for (index, row) in right.iter().enumerate() {
        if let Some(key) = join_key(row, right_keys, key_types, |t| t.1) {
            table.entry(key).or_default().push(index);
        }
    }

    let mut out = Vec::new();
    for row in left {
        let Some(key) = join_key(row, left_keys, key_types, |t| t.0) else {
            continue;
        };
        if let Some(matches) = table.get(&key) {
            if out.len() + matches.len() > max_rows {
                return Err(BridgeError::incompatible(format!(
                    "secondary join output exceeds {} rows",
                    max_rows
                ))
                .into());
            }
            for &index in matches {
                let mut joined = row.clone();
                joined.extend(right[index].iter().cloned());
                out.push(joined);
            }
        }
    }
    Ok(out)
}

/// Hashable key of one side; integers compared with floats are widened
fn join_key(
    row: &[Scalar],
    keys: &[usize],
    key_types: &[(LogicalType, LogicalType)],
    side: fn(&(LogicalType, LogicalType)) -> LogicalType,
) -> Option<Vec<ScalarKey>> {
    keys.iter()
        .zip(key_types)
        .map(|(&index, types)| {
            let value = row.get(index)?;
            if value.is_null() {
                return None;
            }
            let widen = types.0 != types.1
                && (types.0 == LogicalType::Float64 || types.1 == LogicalType::Float64)
                && side(types).is_numeric();
            if widen {
                value.as_f64().map(|v| ScalarKey::from(&Scalar::Float64(v)))
            } else {
                Some(ScalarKey::from(value))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(values: &[Scalar]) -> Row {
        values.to_vec()
    }

    #[test]
    fn test_hash_join_preserves_left_order_and_skips_nulls() {
        let left = vec![
            row(&[Scalar::Int64(2), Scalar::from("b")]),
            row(&[Scalar::Null, Scalar::from("n")]),
            row(&[Scalar::Int64(1), Scalar::from("a")]),
        ];
        let right = vec![
            row(&[Scalar::Int64(1), Scalar::from("x")]),
            row(&[Scalar::Int64(2), Scalar::from("y")]),
            row(&[Scalar::Int64(1), Scalar::from("z")]),
            row(&[Scalar::Null, Scalar::from("n")]),
        ];
        let types = [(LogicalType::Int64, LogicalType::Int64)];
        let joined = hash_join(&left, &right, &[0], &[0], &types, 10).unwrap();
        let tags: Vec<(&str, &str)> = joined
            .iter()
            .map(|r| (r[1].as_str().unwrap(), r[3].as_str().unwrap()))
            .collect();
        assert_eq!(tags, vec![("b", "y"), ("a", "x"), ("a", "z")]);
    }

    #[test]
    fn test_hash_join_widens_mixed_numeric_keys() {
        let left = vec![row(&[Scalar::Int32(3)])];
        let right = vec![row(&[Scalar::Float64(3.0)]), row(&[Scalar::Float64(3.5)])];
        let types = [(LogicalType::Int32, LogicalType::Float64)];
        let joined = hash_join(&left, &right, &[0], &[0], &types, 10).unwrap();
        assert_eq!(joined, vec![vec![Scalar::Int32(3), Scalar::Float64(3.0)]]);
    }

    #[test]
    fn test_hash_join_output_bounded() {
        let left: Vec<Row> = (0..4).map(|i| row(&[Scalar::Int64(7), Scalar::Int64(i)])).collect();
        let right: Vec<Row> = (0..4).map(|i| row(&[Scalar::Int64(7), Scalar::Int64(i)])).collect();
        let types = [(LogicalType::Int64, LogicalType::Int64)];

        let err = hash_join(&left, &right, &[0], &[0], &types, 10).unwrap_err();
        assert_eq!(err.code(), "STRATA_BRIDGE_INCOMPATIBLE_ENGINE");

        let joined = hash_join(&left, &right, &[0], &[0], &types, 16).unwrap();
        assert_eq!(joined.len(), 16);
    }

    #[test]
    fn test_row_collector_flags_overflow() {
        let mut collector = RowCollector {
            rows: Vec::new(),
            max_rows: 1,
            overflowed: false,
        };
        let batch = Batch::try_new(vec![crate::column::ColumnBuffer::new(
            "v",
            crate::column::ColumnData::Int64(vec![Some(1), Some(2)]),
        )])
        .unwrap();
        assert_eq!(collector.push(batch).unwrap(), SinkState::Done);
        assert!(collector.overflowed);
        assert!(collector.rows.is_empty());
    }
}

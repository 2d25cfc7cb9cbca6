//! Hash aggregation
//!
//! A `GroupTable` maps group keys to partial aggregate states. Workers
//! build one table per partition; tables are merged into the query's
//! accumulator, and `finish` emits one row per group ordered by key.

use std::cmp::Ordering;

use hashbrown::{HashMap, HashSet};

use crate::column::{Batch, Scalar, ScalarKey};
use crate::planner::{AggFunc, AggregateExpr};
use crate::schema::{LogicalSchema, LogicalType};

use super::errors::{ExecError, ExecResult};
use super::eval::PhysicalExpr;

/// Partial state of one aggregate for one group
#[derive(Debug, Clone, PartialEq)]
pub enum AggState {
    Count(i64),
    SumInt { sum: i128, seen: bool },
    SumFloat { sum: f64, seen: bool },
    Mean { sum: f64, count: i64 },
    Min(Scalar),
    Max(Scalar),
    Distinct(HashSet<ScalarKey>),
}

impl AggState {
    fn new(func: AggFunc, output_type: LogicalType) -> Self {
        match func {
            AggFunc::Count | AggFunc::CountStar => AggState::Count(0),
            AggFunc::Sum if output_type == LogicalType::Int64 => AggState::SumInt {
                sum: 0,
                seen: false,
            },
            AggFunc::Sum => AggState::SumFloat {
                sum: 0.0,
                seen: false,
            },
            AggFunc::Mean => AggState::Mean { sum: 0.0, count: 0 },
            AggFunc::Min => AggState::Min(Scalar::Null),
            AggFunc::Max => AggState::Max(Scalar::Null),
            AggFunc::DistinctCount => AggState::Distinct(HashSet::new()),
        }
    }

    /// Folds one input value. `count(*)` callers pass any non-null value.
    /// A distinct set may hold at most `limit` values.
    fn update(&mut self, value: &Scalar, limit: usize) -> ExecResult<()> {
        if value.is_null() {
            return Ok(());
        }
        match self {
            AggState::Count(n) => *n += 1,
            AggState::SumInt { sum, seen } => {
                if let Some(v) = value.as_i64() {
                    *sum += v as i128;
                    *seen = true;
                }
            }
            AggState::SumFloat { sum, seen } => {
                if let Some(v) = value.as_f64() {
                    *sum += v;
                    *seen = true;
                }
            }
            AggState::Mean { sum, count } => {
                if let Some(v) = value.as_f64() {
                    *sum += v;
                    *count += 1;
                }
            }
            AggState::Min(current) => {
                if current.is_null() || value.total_cmp(current) == Ordering::Less {
                    *current = value.clone();
                }
            }
            AggState::Max(current) => {
                if current.is_null() || value.total_cmp(current) == Ordering::Greater {
                    *current = value.clone();
                }
            }
            AggState::Distinct(set) => {
                let key = ScalarKey::from(value);
                if set.len() >= limit && !set.contains(&key) {
                    return Err(ExecError::GroupCardinalityExceeded { limit });
                }
                set.insert(key);
            }
        }
        Ok(())
    }

    fn merge(&mut self, other: AggState, limit: usize) -> ExecResult<()> {
        match (self, other) {
            (AggState::Count(a), AggState::Count(b)) => *a += b,
            (AggState::SumInt { sum, seen }, AggState::SumInt { sum: s, seen: k }) => {
                *sum += s;
                *seen |= k;
            }
            (AggState::SumFloat { sum, seen }, AggState::SumFloat { sum: s, seen: k }) => {
                if k {
                    *sum += s;
                    *seen = true;
                }
            }
            (AggState::Mean { sum, count }, AggState::Mean { sum: s, count: c }) => {
                if c > 0 {
                    *sum += s;
                    *count += c;
                }
            }
            (AggState::Min(current), AggState::Min(value)) => {
                if !value.is_null()
                    && (current.is_null() || value.total_cmp(current) == Ordering::Less)
                {
                    *current = value;
                }
            }
            (AggState::Max(current), AggState::Max(value)) => {
                if !value.is_null()
                    && (current.is_null() || value.total_cmp(current) == Ordering::Greater)
                {
                    *current = value;
                }
            }
            (AggState::Distinct(a), AggState::Distinct(b)) => {
                a.extend(b);
                if a.len() > limit {
                    return Err(ExecError::GroupCardinalityExceeded { limit });
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn finish(self, name: &str) -> ExecResult<Scalar> {
        Ok(match self {
            AggState::Count(n) => Scalar::Int64(n),
            AggState::SumInt { seen: false, .. } | AggState::SumFloat { seen: false, .. } => {
                Scalar::Null
            }
            AggState::SumInt { sum, .. } => Scalar::Int64(i64::try_from(sum).map_err(|_| {
                ExecError::ArithmeticOverflow {
                    column: name.to_string(),
                }
            })?),
            AggState::SumFloat { sum, .. } => Scalar::Float64(sum),
            AggState::Mean { count: 0, .. } => Scalar::Null,
            AggState::Mean { sum, count } => Scalar::Float64(sum / count as f64),
            AggState::Min(v) | AggState::Max(v) => v,
            AggState::Distinct(set) => Scalar::Int64(set.len() as i64),
        })
    }
}

#[derive(Debug, Clone)]
struct AggSpec {
    func: AggFunc,
    output_type: LogicalType,
    name: String,
}

fn initial_states(specs: &[AggSpec]) -> Vec<AggState> {
    specs
        .iter()
        .map(|s| AggState::new(s.func, s.output_type))
        .collect()
}

/// Group key to partial aggregate states
#[derive(Debug, Clone)]
pub struct GroupTable {
    output_schema: LogicalSchema,
    key_count: usize,
    specs: Vec<AggSpec>,
    groups: HashMap<Vec<ScalarKey>, Vec<AggState>>,
    max_groups: usize,
}

impl GroupTable {
    /// Empty table producing `output_schema`: `key_count` group columns
    /// followed by one column per aggregate
    pub fn new(
        output_schema: LogicalSchema,
        key_count: usize,
        aggregates: &[AggregateExpr],
        max_groups: usize,
    ) -> Self {
        let specs = aggregates
            .iter()
            .zip(output_schema.fields().iter().skip(key_count))
            .map(|(agg, field)| AggSpec {
                func: agg.func,
                output_type: field.logical_type,
                name: agg.name.clone(),
            })
            .collect();
        Self {
            output_schema,
            key_count,
            specs,
            groups: HashMap::new(),
            max_groups,
        }
    }

    /// Same layout, no groups
    pub fn empty_like(&self) -> Self {
        Self {
            output_schema: self.output_schema.clone(),
            key_count: self.key_count,
            specs: self.specs.clone(),
            groups: HashMap::new(),
            max_groups: self.max_groups,
        }
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    fn states_for(&mut self, key: Vec<ScalarKey>) -> ExecResult<&mut Vec<AggState>> {
        if !self.groups.contains_key(&key) && self.groups.len() >= self.max_groups {
            return Err(ExecError::GroupCardinalityExceeded {
                limit: self.max_groups,
            });
        }
        let specs = &self.specs;
        Ok(self
            .groups
            .entry(key)
            .or_insert_with(|| initial_states(specs)))
    }

    /// Folds one input row: its group key and one value per aggregate
    pub fn accumulate(&mut self, key: Vec<ScalarKey>, values: &[Scalar]) -> ExecResult<()> {
        let limit = self.max_groups;
        let states = self.states_for(key)?;
        for (state, value) in states.iter_mut().zip(values) {
            state.update(value, limit)?;
        }
        Ok(())
    }

    /// Merges another table's partial states into this one
    pub fn merge(&mut self, other: GroupTable) -> ExecResult<()> {
        let limit = self.max_groups;
        for (key, partial) in other.groups {
            let states = self.states_for(key)?;
            for (state, p) in states.iter_mut().zip(partial) {
                state.merge(p, limit)?;
            }
        }
        Ok(())
    }

    /// One row per group, ordered by group key with nulls first. A global
    /// aggregate always yields exactly one row.
    pub fn finish(mut self) -> ExecResult<Batch> {
        if self.key_count == 0 && self.groups.is_empty() {
            self.groups.insert(Vec::new(), initial_states(&self.specs));
        }
        let key_types: Vec<LogicalType> = self
            .output_schema
            .fields()
            .iter()
            .take(self.key_count)
            .map(|f| f.logical_type)
            .collect();

        let mut rows = Vec::with_capacity(self.groups.len());
        for (key, states) in self.groups {
            let mut row: Vec<Scalar> = key
                .iter()
                .zip(&key_types)
                .map(|(k, t)| k.to_scalar(*t))
                .collect();
            for (state, spec) in states.into_iter().zip(&self.specs) {
                row.push(state.finish(&spec.name)?);
            }
            rows.push(row);
        }
        let key_count = self.key_count;
        rows.sort_by(|a, b| {
            a.iter()
                .zip(b.iter())
                .take(key_count)
                .map(|(x, y)| x.total_cmp(y))
                .find(|o| *o != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        });
        Batch::from_rows(&self.output_schema, rows).map_err(|column| {
            ExecError::invalid_value(column, "aggregate value does not fit the output type")
        })
    }
}

/// Compiled group keys and aggregate inputs of one aggregate node
#[derive(Debug, Clone)]
pub struct AggregateInputs {
    keys: Vec<usize>,
    inputs: Vec<Option<PhysicalExpr>>,
}

impl AggregateInputs {
    pub fn compile(
        input_schema: &LogicalSchema,
        group_by: &[String],
        aggregates: &[AggregateExpr],
    ) -> ExecResult<Self> {
        let keys = group_by
            .iter()
            .map(|k| {
                input_schema
                    .index_of(k)
                    .ok_or_else(|| ExecError::invalid_value(k, "unknown group column"))
            })
            .collect::<ExecResult<Vec<_>>>()?;
        let inputs = aggregates
            .iter()
            .map(|agg| {
                agg.input
                    .as_ref()
                    .map(|e| PhysicalExpr::compile(e, input_schema))
                    .transpose()
            })
            .collect::<ExecResult<Vec<_>>>()?;
        Ok(Self { keys, inputs })
    }

    /// Folds every row of a batch into `table`
    pub fn accumulate_batch(&self, table: &mut GroupTable, batch: &Batch) -> ExecResult<()> {
        let inputs = self
            .inputs
            .iter()
            .map(|input| input.as_ref().map(|e| e.eval(batch)).transpose())
            .collect::<ExecResult<Vec<_>>>()?;
        let star = Scalar::Bool(true);
        let mut values = Vec::with_capacity(inputs.len());
        for row in 0..batch.num_rows() {
            let key = self
                .keys
                .iter()
                .map(|&i| ScalarKey::from(&batch.columns()[i].value(row)))
                .collect();
            values.clear();
            values.extend(inputs.iter().map(|input| match input {
                Some(data) => data.value(row),
                None => star.clone(),
            }));
            table.accumulate(key, &values)?;
        }
        Ok(())
    }

    /// Folds one row laid out like the input schema into `table`
    pub fn accumulate_row(&self, table: &mut GroupTable, row: &[Scalar]) -> ExecResult<()> {
        let key = self
            .keys
            .iter()
            .map(|&i| ScalarKey::from(row.get(i).unwrap_or(&Scalar::Null)))
            .collect();
        let values: Vec<Scalar> = self
            .inputs
            .iter()
            .map(|input| match input {
                Some(expr) => expr.eval_row(row),
                None => Scalar::Bool(true),
            })
            .collect();
        table.accumulate(key, &values)
    }
}

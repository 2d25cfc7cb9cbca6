//! Translation of logical plans into row plans
//!
//! A row plan is the secondary engine's own tree. Expressions are compiled
//! against the schema of each node's input, so evaluation works on plain
//! `Vec<Scalar>` rows.

use std::sync::Arc;

use crate::catalog::DatasetHandle;
use crate::executor::{AggregateInputs, ExecError, ExecResult, GroupTable, PhysicalExpr, ResolvedKeys};
use crate::planner::{Engine, NodeKind, PlanNode};
use crate::schema::{LogicalSchema, LogicalType};

/// Where the secondary engine gets its input rows
#[derive(Debug)]
pub(crate) enum RowSource {
    /// Supported prefix run by the primary engine
    Primary(Arc<PlanNode>),
    /// Scan read directly through the columnar reader
    Scan {
        dataset: DatasetHandle,
        columns: Vec<String>,
    },
}

#[derive(Debug)]
pub(crate) enum RowPlan {
    Source(RowSource),
    Filter {
        input: Box<RowPlan>,
        predicate: PhysicalExpr,
    },
    Project {
        input: Box<RowPlan>,
        exprs: Vec<PhysicalExpr>,
    },
    Aggregate {
        input: Box<RowPlan>,
        inputs: AggregateInputs,
        table: GroupTable,
    },
    Sort {
        input: Box<RowPlan>,
        keys: ResolvedKeys,
        fetch: Option<usize>,
    },
    Limit {
        input: Box<RowPlan>,
        n: usize,
    },
    /// Inner hash join; `key_types` holds the (left, right) type of each
    /// key pair
    Join {
        left: Box<RowPlan>,
        right: Box<RowPlan>,
        left_keys: Vec<usize>,
        right_keys: Vec<usize>,
        key_types: Vec<(LogicalType, LogicalType)>,
    },
}

impl RowPlan {
    /// Translates the subtree at `node`.
    ///
    /// With `whole` set every node is translated; otherwise the input of
    /// each `BridgeOut`, and any primary-owned node, becomes a primary
    /// source.
    pub(crate) fn translate(node: &Arc<PlanNode>, whole: bool) -> ExecResult<Self> {
        if !whole && node.engine() == Engine::Primary {
            return Ok(RowPlan::Source(RowSource::Primary(Arc::clone(node))));
        }
        let plan = match node.kind() {
            NodeKind::Scan { dataset, columns } => RowPlan::Source(RowSource::Scan {
                dataset: dataset.clone(),
                columns: columns.clone(),
            }),
            NodeKind::BridgeOut { input } => {
                if whole {
                    Self::translate(input, whole)?
                } else {
                    RowPlan::Source(RowSource::Primary(Arc::clone(input)))
                }
            }
            NodeKind::Filter { input, predicate } => RowPlan::Filter {
                predicate: PhysicalExpr::compile(predicate, input.schema())?,
                input: Box::new(Self::translate(input, whole)?),
            },
            NodeKind::Project { input, exprs } => RowPlan::Project {
                exprs: exprs
                    .iter()
                    .map(|e| PhysicalExpr::compile(&e.expr, input.schema()))
                    .collect::<ExecResult<Vec<_>>>()?,
                input: Box::new(Self::translate(input, whole)?),
            },
            NodeKind::Aggregate {
                input,
                group_by,
                aggregates,
            } => RowPlan::Aggregate {
                inputs: AggregateInputs::compile(input.schema(), group_by, aggregates)?,
                table: GroupTable::new(node.schema().clone(), group_by.len(), aggregates, usize::MAX),
                input: Box::new(Self::translate(input, whole)?),
            },
            NodeKind::Sort { input, keys, fetch } => {
                let names: Vec<&str> = input.schema().names().collect();
                RowPlan::Sort {
                    keys: ResolvedKeys::resolve(&names, keys)?,
                    fetch: *fetch,
                    input: Box::new(Self::translate(input, whole)?),
                }
            }
            NodeKind::Limit { input, n } => RowPlan::Limit {
                n: *n,
                input: Box::new(Self::translate(input, whole)?),
            },
            NodeKind::Join { left, right, on } => {
                let mut left_keys = Vec::with_capacity(on.len());
                let mut right_keys = Vec::with_capacity(on.len());
                let mut key_types = Vec::with_capacity(on.len());
                for (l, r) in on {
                    let (li, lt) = resolve(left.schema(), l)?;
                    let (ri, rt) = resolve(right.schema(), r)?;
                    left_keys.push(li);
                    right_keys.push(ri);
                    key_types.push((lt, rt));
                }
                RowPlan::Join {
                    left: Box::new(Self::translate(left, whole)?),
                    right: Box::new(Self::translate(right, whole)?),
                    left_keys,
                    right_keys,
                    key_types,
                }
            }
        };
        Ok(plan)
    }

    /// Number of row sources feeding this plan
    pub(crate) fn source_count(&self) -> usize {
        match self {
            RowPlan::Source(_) => 1,
            RowPlan::Filter { input, .. }
            | RowPlan::Project { input, .. }
            | RowPlan::Aggregate { input, .. }
            | RowPlan::Sort { input, .. }
            | RowPlan::Limit { input, .. } => input.source_count(),
            RowPlan::Join { left, right, .. } => left.source_count() + right.source_count(),
        }
    }
}

fn resolve(schema: &LogicalSchema, column: &str) -> ExecResult<(usize, LogicalType)> {
    let index = schema
        .index_of(column)
        .ok_or_else(|| ExecError::invalid_value(column, "unknown join column"))?;
    let logical_type = schema
        .field(column)
        .map(|f| f.logical_type)
        .ok_or_else(|| ExecError::invalid_value(column, "unknown join column"))?;
    Ok((index, logical_type))
}

//! Immutable logical query plans
//!
//! Each builder call type-checks its arguments against the current output
//! schema, asks the owning engine whether it can run the new node, and
//! returns a new plan whose root shares the previous one by `Arc`.

use std::sync::Arc;

use crate::catalog::DatasetHandle;
use crate::column::{CompareOp, Scalar};
use crate::schema::{Field, LogicalSchema, LogicalType};

use super::capability::{EngineCapabilities, PrimaryCapabilities};
use super::errors::{PlanError, PlanResult};
use super::expr::{comparable, AggregateExpr, Expr, NamedExpr, SortKey};

/// Engine that executes a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Engine {
    Primary,
    Secondary,
}

impl Engine {
    pub fn as_str(&self) -> &'static str {
        match self {
            Engine::Primary => "primary",
            Engine::Secondary => "secondary",
        }
    }
}

/// Operator of a plan node
#[derive(Debug, Clone)]
pub enum NodeKind {
    Scan {
        dataset: DatasetHandle,
        columns: Vec<String>,
    },
    Filter {
        input: Arc<PlanNode>,
        predicate: Expr,
    },
    Project {
        input: Arc<PlanNode>,
        exprs: Vec<NamedExpr>,
    },
    Aggregate {
        input: Arc<PlanNode>,
        group_by: Vec<String>,
        aggregates: Vec<AggregateExpr>,
    },
    /// Full sort, or top-k when `fetch` is set
    Sort {
        input: Arc<PlanNode>,
        keys: Vec<SortKey>,
        fetch: Option<usize>,
    },
    Limit {
        input: Arc<PlanNode>,
        n: usize,
    },
    /// Inner equi-join, always run by the secondary engine
    Join {
        left: Arc<PlanNode>,
        right: Arc<PlanNode>,
        on: Vec<(String, String)>,
    },
    /// Boundary below which the primary engine produces rows for the
    /// secondary engine
    BridgeOut { input: Arc<PlanNode> },
}

impl NodeKind {
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Scan { .. } => "Scan",
            NodeKind::Filter { .. } => "Filter",
            NodeKind::Project { .. } => "Project",
            NodeKind::Aggregate { .. } => "Aggregate",
            NodeKind::Sort { fetch: Some(_), .. } => "TopK",
            NodeKind::Sort { .. } => "Sort",
            NodeKind::Limit { .. } => "Limit",
            NodeKind::Join { .. } => "Join",
            NodeKind::BridgeOut { .. } => "BridgeOut",
        }
    }
}

/// One node of a query plan with its output schema and owning engine
#[derive(Debug, Clone)]
pub struct PlanNode {
    kind: NodeKind,
    schema: LogicalSchema,
    engine: Engine,
    estimated_rows: u64,
}

impl PlanNode {
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn schema(&self) -> &LogicalSchema {
        &self.schema
    }

    pub fn engine(&self) -> Engine {
        self.engine
    }

    /// Upper bound on output rows derived from partition metadata
    pub fn estimated_rows(&self) -> u64 {
        self.estimated_rows
    }

    pub fn inputs(&self) -> Vec<&Arc<PlanNode>> {
        match &self.kind {
            NodeKind::Scan { .. } => Vec::new(),
            NodeKind::Filter { input, .. }
            | NodeKind::Project { input, .. }
            | NodeKind::Aggregate { input, .. }
            | NodeKind::Sort { input, .. }
            | NodeKind::Limit { input, .. }
            | NodeKind::BridgeOut { input } => vec![input],
            NodeKind::Join { left, right, .. } => vec![left, right],
        }
    }

    /// Same node over different inputs, in `inputs()` order
    fn with_inputs(&self, mut inputs: Vec<Arc<PlanNode>>) -> PlanNode {
        let mut kind = self.kind.clone();
        match &mut kind {
            NodeKind::Scan { .. } => {}
            NodeKind::Filter { input, .. }
            | NodeKind::Project { input, .. }
            | NodeKind::Aggregate { input, .. }
            | NodeKind::Sort { input, .. }
            | NodeKind::Limit { input, .. }
            | NodeKind::BridgeOut { input } => {
                if let Some(new) = inputs.pop() {
                    *input = new;
                }
            }
            NodeKind::Join { left, right, .. } => {
                if let Some(new) = inputs.pop() {
                    *right = new;
                }
                if let Some(new) = inputs.pop() {
                    *left = new;
                }
            }
        }
        PlanNode {
            kind,
            schema: self.schema.clone(),
            engine: self.engine,
            estimated_rows: self.estimated_rows,
        }
    }
}

/// Lazily built, immutable query over a dataset.
///
/// Cloning is cheap: nodes are shared. No builder call reads partition data.
#[derive(Debug, Clone)]
pub struct QueryPlan {
    root: Arc<PlanNode>,
    caps: Arc<dyn EngineCapabilities>,
}

impl QueryPlan {
    /// Scans `columns` of `dataset` with default primary capabilities
    pub fn scan<S: AsRef<str>>(dataset: &DatasetHandle, columns: &[S]) -> PlanResult<Self> {
        Self::scan_with(dataset, columns, Arc::new(PrimaryCapabilities::default()))
    }

    /// Scans `columns` of `dataset` against the given primary capabilities
    pub fn scan_with<S: AsRef<str>>(
        dataset: &DatasetHandle,
        columns: &[S],
        caps: Arc<dyn EngineCapabilities>,
    ) -> PlanResult<Self> {
        if columns.is_empty() {
            return Err(PlanError::invalid("scan must read at least one column"));
        }
        let schema = dataset.schema().project(columns).map_err(PlanError::unknown_column)?;
        let columns = schema.names().map(str::to_string).collect();
        let node = PlanNode {
            kind: NodeKind::Scan {
                dataset: dataset.clone(),
                columns,
            },
            schema,
            engine: Engine::Primary,
            estimated_rows: dataset.total_rows(),
        };
        Ok(Self {
            root: Arc::new(node),
            caps,
        })
    }

    pub fn root(&self) -> &Arc<PlanNode> {
        &self.root
    }

    /// Output schema of the plan
    pub fn schema(&self) -> &LogicalSchema {
        self.root.schema()
    }

    /// Engine owning the root node
    pub fn engine(&self) -> Engine {
        self.root.engine()
    }

    pub fn estimated_rows(&self) -> u64 {
        self.root.estimated_rows()
    }

    pub fn capabilities(&self) -> &Arc<dyn EngineCapabilities> {
        &self.caps
    }

    fn push(&self, kind: NodeKind, schema: LogicalSchema, estimated_rows: u64) -> Self {
        self.push_owned(kind, schema, estimated_rows, self.root.engine)
    }

    fn push_owned(
        &self,
        kind: NodeKind,
        schema: LogicalSchema,
        estimated_rows: u64,
        engine: Engine,
    ) -> Self {
        Self {
            root: Arc::new(PlanNode {
                kind,
                schema,
                engine,
                estimated_rows,
            }),
            caps: Arc::clone(&self.caps),
        }
    }

    fn check_supported(&self, expr: &Expr) -> PlanResult<()> {
        if self.root.engine == Engine::Primary {
            if let Some(construct) = self.caps.unsupported_construct(expr) {
                return Err(PlanError::unsupported(construct));
            }
        }
        Ok(())
    }

    /// Keeps rows for which `predicate` is true
    pub fn filter(&self, predicate: Expr) -> PlanResult<Self> {
        let data_type = predicate.data_type(self.schema())?;
        if data_type != LogicalType::Bool {
            return Err(PlanError::type_mismatch(
                &predicate,
                format!("filter predicate must be bool, got {}", data_type),
            ));
        }
        self.check_supported(&predicate)?;
        Ok(self.push(
            NodeKind::Filter {
                input: Arc::clone(&self.root),
                predicate,
            },
            self.schema().clone(),
            self.estimated_rows(),
        ))
    }

    /// Computes one output column per expression
    pub fn project<I, E>(&self, exprs: I) -> PlanResult<Self>
    where
        I: IntoIterator<Item = E>,
        E: Into<NamedExpr>,
    {
        let exprs: Vec<NamedExpr> = exprs.into_iter().map(Into::into).collect();
        if exprs.is_empty() {
            return Err(PlanError::invalid("projection must produce at least one column"));
        }
        let mut fields: Vec<Field> = Vec::with_capacity(exprs.len());
        for named in &exprs {
            let data_type = named.expr.data_type(self.schema())?;
            self.check_supported(&named.expr)?;
            push_unique(&mut fields, Field::new(named.name.clone(), data_type))?;
        }
        Ok(self.push(
            NodeKind::Project {
                input: Arc::clone(&self.root),
                exprs,
            },
            LogicalSchema::from_fields_unchecked(fields),
            self.estimated_rows(),
        ))
    }

    /// Groups by `group_by` columns and computes `aggregates` per group.
    ///
    /// Output columns are the group keys followed by the aggregates.
    pub fn aggregate<S: AsRef<str>>(
        &self,
        group_by: &[S],
        aggregates: Vec<AggregateExpr>,
    ) -> PlanResult<Self> {
        if group_by.is_empty() && aggregates.is_empty() {
            return Err(PlanError::invalid("aggregate needs group keys or aggregates"));
        }
        let mut fields: Vec<Field> = Vec::new();
        for key in group_by {
            let key = key.as_ref();
            let field = self
                .schema()
                .field(key)
                .ok_or_else(|| PlanError::unknown_column(key))?;
            push_unique(&mut fields, field.clone())?;
        }
        for agg in &aggregates {
            let data_type = agg.data_type(self.schema())?;
            if let Some(input) = &agg.input {
                self.check_supported(input)?;
            }
            push_unique(&mut fields, Field::new(agg.name.clone(), data_type))?;
        }

        let estimated_rows = if group_by.is_empty() {
            1
        } else {
            self.estimated_rows().min(self.caps.max_groups() as u64)
        };
        Ok(self.push(
            NodeKind::Aggregate {
                input: Arc::clone(&self.root),
                group_by: group_by.iter().map(|k| k.as_ref().to_string()).collect(),
                aggregates,
            },
            LogicalSchema::from_fields_unchecked(fields),
            estimated_rows,
        ))
    }

    /// Full stable sort by `keys`.
    ///
    /// On the primary engine the estimated input must fit `max_sort_rows`.
    pub fn sort(&self, keys: Vec<SortKey>) -> PlanResult<Self> {
        self.check_sort_keys(&keys)?;
        if self.engine() == Engine::Primary {
            let budget = self.caps.max_sort_rows() as u64;
            if self.estimated_rows() > budget {
                return Err(PlanError::unsupported(format!(
                    "sort of up to {} rows (max_sort_rows {})",
                    self.estimated_rows(),
                    budget
                )));
            }
        }
        Ok(self.sorted(keys, None))
    }

    /// First `n` rows in `keys` order, kept as a bounded top-k
    pub fn top_k(&self, keys: Vec<SortKey>, n: usize) -> PlanResult<Self> {
        self.check_sort_keys(&keys)?;
        if self.engine() == Engine::Primary && n > self.caps.max_sort_rows() {
            return Err(PlanError::unsupported(format!(
                "top-k of {} rows (max_sort_rows {})",
                n,
                self.caps.max_sort_rows()
            )));
        }
        Ok(self.sorted(keys, Some(n)))
    }

    fn check_sort_keys(&self, keys: &[SortKey]) -> PlanResult<()> {
        if keys.is_empty() {
            return Err(PlanError::invalid("sort needs at least one key"));
        }
        for key in keys {
            if self.schema().field(&key.column).is_none() {
                return Err(PlanError::unknown_column(&key.column));
            }
        }
        Ok(())
    }

    fn sorted(&self, keys: Vec<SortKey>, fetch: Option<usize>) -> Self {
        let estimated_rows = match fetch {
            Some(n) => self.estimated_rows().min(n as u64),
            None => self.estimated_rows(),
        };
        self.push(
            NodeKind::Sort {
                input: Arc::clone(&self.root),
                keys,
                fetch,
            },
            self.schema().clone(),
            estimated_rows,
        )
    }

    /// Keeps the first `n` rows. Directly after a sort this becomes a top-k.
    pub fn limit(&self, n: usize) -> PlanResult<Self> {
        if let NodeKind::Sort { input, keys, fetch } = &self.root.kind {
            let fetch = Some(fetch.map_or(n, |f| f.min(n)));
            let kind = NodeKind::Sort {
                input: Arc::clone(input),
                keys: keys.clone(),
                fetch,
            };
            let estimated_rows = input.estimated_rows.min(n as u64);
            return Ok(self.push(kind, self.schema().clone(), estimated_rows));
        }
        Ok(self.push(
            NodeKind::Limit {
                input: Arc::clone(&self.root),
                n,
            },
            self.schema().clone(),
            self.estimated_rows().min(n as u64),
        ))
    }

    /// Hands the plan built so far to the secondary engine. Every node added
    /// afterwards is secondary-owned.
    pub fn delegate(&self) -> Self {
        if self.engine() == Engine::Secondary {
            return self.clone();
        }
        self.push_owned(
            NodeKind::BridgeOut {
                input: Arc::clone(&self.root),
            },
            self.schema().clone(),
            self.estimated_rows(),
            Engine::Secondary,
        )
    }

    /// Inner equi-join with `right` on `(left column, right column)` pairs.
    ///
    /// Joins run on the secondary engine; a primary-owned left side must be
    /// delegated first. Right columns whose names collide with a left column
    /// get a `_right` suffix.
    pub fn join(&self, right: &QueryPlan, on: &[(&str, &str)]) -> PlanResult<Self> {
        if self.engine() == Engine::Primary && !self.caps.supports_join() {
            return Err(PlanError::unsupported("join"));
        }
        if on.is_empty() {
            return Err(PlanError::invalid("join needs at least one key pair"));
        }
        for (l, r) in on {
            let lt = self
                .schema()
                .field(l)
                .ok_or_else(|| PlanError::unknown_column(*l))?
                .logical_type;
            let rt = right
                .schema()
                .field(r)
                .ok_or_else(|| PlanError::unknown_column(*r))?
                .logical_type;
            if !comparable(lt, rt) {
                return Err(PlanError::type_mismatch(
                    format!("{} = {}", l, r),
                    format!("cannot join {} with {}", lt, rt),
                ));
            }
        }

        let right = right.delegate();
        let mut fields: Vec<Field> = self.schema().fields().to_vec();
        for field in right.schema().fields() {
            let mut name = field.name.clone();
            while fields.iter().any(|f| f.name == name) {
                name.push_str("_right");
            }
            fields.push(Field::new(name, field.logical_type));
        }
        let estimated_rows = self.estimated_rows().saturating_mul(right.estimated_rows());
        Ok(self.push_owned(
            NodeKind::Join {
                left: Arc::clone(&self.root),
                right: Arc::clone(&right.root),
                on: on
                    .iter()
                    .map(|(l, r)| (l.to_string(), r.to_string()))
                    .collect(),
            },
            LogicalSchema::from_fields_unchecked(fields),
            estimated_rows,
            Engine::Secondary,
        ))
    }

    fn or_delegate(&self, build: impl Fn(&QueryPlan) -> PlanResult<QueryPlan>) -> PlanResult<Self> {
        match build(self) {
            Err(err) if err.is_unsupported() && self.engine() == Engine::Primary => {
                build(&self.delegate())
            }
            other => other,
        }
    }

    /// `filter`, delegating to the secondary engine if the primary cannot
    /// evaluate the predicate
    pub fn filter_or_delegate(&self, predicate: Expr) -> PlanResult<Self> {
        self.or_delegate(|plan| plan.filter(predicate.clone()))
    }

    /// `project`, delegating to the secondary engine if needed
    pub fn project_or_delegate<I, E>(&self, exprs: I) -> PlanResult<Self>
    where
        I: IntoIterator<Item = E>,
        E: Into<NamedExpr>,
    {
        let exprs: Vec<NamedExpr> = exprs.into_iter().map(Into::into).collect();
        self.or_delegate(|plan| plan.project(exprs.clone()))
    }

    /// `sort`, delegating to the secondary engine when the estimate exceeds
    /// the primary sort budget
    pub fn sort_or_delegate(&self, keys: Vec<SortKey>) -> PlanResult<Self> {
        self.or_delegate(|plan| plan.sort(keys.clone()))
    }

    /// Copy of the plan with the literal of its single `column = literal`
    /// predicate replaced by `value`. All other nodes are shared.
    pub fn with_filter_value(&self, column: &str, value: impl Into<Scalar>) -> PlanResult<Self> {
        let value = value.into();
        let found = count_equalities(&self.root, column);
        if found != 1 {
            return Err(PlanError::invalid(format!(
                "expected exactly one equality predicate on '{}', found {}",
                column, found
            )));
        }
        let root = match swap_literal(&self.root, column, &value)? {
            Some(root) => root,
            None => Arc::clone(&self.root),
        };
        Ok(Self {
            root,
            caps: Arc::clone(&self.caps),
        })
    }
}

fn push_unique(fields: &mut Vec<Field>, field: Field) -> PlanResult<()> {
    if fields.iter().any(|f| f.name == field.name) {
        return Err(PlanError::invalid(format!(
            "duplicate output column '{}'",
            field.name
        )));
    }
    fields.push(field);
    Ok(())
}

fn is_equality_on(expr: &Expr, column: &str) -> bool {
    matches!(
        expr.as_column_comparison(),
        Some((c, CompareOp::Eq, _)) if c == column
    )
}

fn count_in_expr(expr: &Expr, column: &str) -> usize {
    let here = usize::from(is_equality_on(expr, column));
    let below = match expr {
        Expr::Column(_) | Expr::Literal(_) => 0,
        Expr::Compare { left, right, .. }
        | Expr::Arith { left, right, .. }
        | Expr::And(left, right)
        | Expr::Or(left, right) => count_in_expr(left, column) + count_in_expr(right, column),
        Expr::Not(inner)
        | Expr::IsNull(inner)
        | Expr::Like { expr: inner, .. }
        | Expr::StringFn { expr: inner, .. } => count_in_expr(inner, column),
    };
    here + below
}

fn count_equalities(node: &PlanNode, column: &str) -> usize {
    let here = match &node.kind {
        NodeKind::Filter { predicate, .. } => count_in_expr(predicate, column),
        _ => 0,
    };
    here + node
        .inputs()
        .into_iter()
        .map(|input| count_equalities(input, column))
        .sum::<usize>()
}

fn replace_in_expr(expr: &Expr, column: &str, value: &Scalar) -> Expr {
    if is_equality_on(expr, column) {
        return Expr::Column(column.to_string()).eq(Expr::Literal(value.clone()));
    }
    let recurse = |e: &Expr| Box::new(replace_in_expr(e, column, value));
    match expr {
        Expr::Column(_) | Expr::Literal(_) => expr.clone(),
        Expr::Compare { op, left, right } => Expr::Compare {
            op: *op,
            left: recurse(left),
            right: recurse(right),
        },
        Expr::Arith { op, left, right } => Expr::Arith {
            op: *op,
            left: recurse(left),
            right: recurse(right),
        },
        Expr::And(left, right) => Expr::And(recurse(left), recurse(right)),
        Expr::Or(left, right) => Expr::Or(recurse(left), recurse(right)),
        Expr::Not(inner) => Expr::Not(recurse(inner)),
        Expr::IsNull(inner) => Expr::IsNull(recurse(inner)),
        Expr::Like { expr, pattern } => Expr::Like {
            expr: recurse(expr),
            pattern: pattern.clone(),
        },
        Expr::StringFn { func, expr } => Expr::StringFn {
            func: *func,
            expr: recurse(expr),
        },
    }
}

/// Rebuilds the path to the filter holding the predicate. `None` means the
/// subtree is unchanged.
fn swap_literal(
    node: &Arc<PlanNode>,
    column: &str,
    value: &Scalar,
) -> PlanResult<Option<Arc<PlanNode>>> {
    if let NodeKind::Filter { input, predicate } = &node.kind {
        if count_in_expr(predicate, column) == 1 {
            let column_type = input
                .schema
                .field(column)
                .ok_or_else(|| PlanError::unknown_column(column))?
                .logical_type;
            match value.logical_type() {
                Some(t) if comparable(t, column_type) => {}
                Some(t) => {
                    return Err(PlanError::type_mismatch(
                        predicate,
                        format!("cannot compare {} column '{}' with {}", column_type, column, t),
                    ))
                }
                None => {
                    return Err(PlanError::type_mismatch(
                        predicate,
                        "null literal has no type; use is_null()",
                    ))
                }
            }
            let mut replaced = (**node).clone();
            replaced.kind = NodeKind::Filter {
                input: Arc::clone(input),
                predicate: replace_in_expr(predicate, column, value),
            };
            return Ok(Some(Arc::new(replaced)));
        }
    }

    let inputs = node.inputs();
    let mut changed = false;
    let mut rebuilt = Vec::with_capacity(inputs.len());
    for input in inputs {
        match swap_literal(input, column, value)? {
            Some(new) => {
                changed = true;
                rebuilt.push(new);
            }
            None => rebuilt.push(Arc::clone(input)),
        }
    }
    if changed {
        Ok(Some(Arc::new(node.with_inputs(rebuilt))))
    } else {
        Ok(None)
    }
}

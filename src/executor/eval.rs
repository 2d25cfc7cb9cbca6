//! Expression evaluation
//!
//! Expressions are compiled once per query against the schema of the node
//! they run on, resolving column names to positions. The same compiled form
//! evaluates whole batches for the primary engine and single rows for the
//! secondary engine, so both engines share one set of value semantics.

use regex::Regex;

use crate::column::{ArithOp, Batch, ColumnData, CompareOp, Scalar};
use crate::planner::{Expr, StringFunc};
use crate::schema::{LogicalSchema, LogicalType};

use super::errors::{ExecError, ExecResult};

#[derive(Debug, Clone)]
enum Op {
    Column(usize),
    Literal(Scalar),
    Compare(CompareOp),
    And,
    Or,
    Not,
    IsNull,
    Arith(ArithOp),
    Like(Regex),
    StringFn(StringFunc),
}

/// Expression with resolved column positions and a known output type
#[derive(Debug, Clone)]
pub struct PhysicalExpr {
    op: Op,
    children: Vec<PhysicalExpr>,
    data_type: LogicalType,
    label: String,
}

impl PhysicalExpr {
    /// Compiles `expr` against the columns of `schema`
    pub fn compile(expr: &Expr, schema: &LogicalSchema) -> ExecResult<Self> {
        let data_type = expr
            .data_type(schema)
            .map_err(|e| ExecError::invalid_value(expr, e.to_string()))?;
        let (op, children) = match expr {
            Expr::Column(name) => {
                let index = schema
                    .index_of(name)
                    .ok_or_else(|| ExecError::invalid_value(expr, "unknown column"))?;
                (Op::Column(index), Vec::new())
            }
            Expr::Literal(value) => (Op::Literal(value.clone()), Vec::new()),
            Expr::Compare { op, left, right } => (
                Op::Compare(*op),
                vec![Self::compile(left, schema)?, Self::compile(right, schema)?],
            ),
            Expr::And(left, right) => (
                Op::And,
                vec![Self::compile(left, schema)?, Self::compile(right, schema)?],
            ),
            Expr::Or(left, right) => (
                Op::Or,
                vec![Self::compile(left, schema)?, Self::compile(right, schema)?],
            ),
            Expr::Not(inner) => (Op::Not, vec![Self::compile(inner, schema)?]),
            Expr::IsNull(inner) => (Op::IsNull, vec![Self::compile(inner, schema)?]),
            Expr::Arith { op, left, right } => (
                Op::Arith(*op),
                vec![Self::compile(left, schema)?, Self::compile(right, schema)?],
            ),
            Expr::Like { expr: inner, pattern } => {
                let regex = like_to_regex(pattern)
                    .map_err(|e| ExecError::invalid_value(expr, e.to_string()))?;
                (Op::Like(regex), vec![Self::compile(inner, schema)?])
            }
            Expr::StringFn { func, expr: inner } => {
                (Op::StringFn(*func), vec![Self::compile(inner, schema)?])
            }
        };
        Ok(Self {
            op,
            children,
            data_type,
            label: expr.to_string(),
        })
    }

    pub fn data_type(&self) -> LogicalType {
        self.data_type
    }

    /// Evaluates against one row laid out like the compile-time schema
    pub fn eval_row(&self, row: &[Scalar]) -> Scalar {
        match &self.op {
            Op::Column(index) => row.get(*index).cloned().unwrap_or(Scalar::Null),
            Op::Literal(value) => value.clone(),
            _ => {
                let args: Vec<Scalar> = self.children.iter().map(|c| c.eval_row(row)).collect();
                self.apply(&args)
            }
        }
    }

    /// Evaluates against every row of a batch laid out like the
    /// compile-time schema
    pub fn eval(&self, batch: &Batch) -> ExecResult<ColumnData> {
        let rows = batch.num_rows();
        match &self.op {
            Op::Column(index) => batch
                .columns()
                .get(*index)
                .map(|c| c.data().clone())
                .ok_or_else(|| ExecError::invalid_value(&self.label, "column missing from batch")),
            Op::Literal(value) => {
                let mut out = ColumnData::with_capacity(self.data_type, rows);
                for _ in 0..rows {
                    self.push(&mut out, value.clone())?;
                }
                Ok(out)
            }
            _ => {
                let inputs = self
                    .children
                    .iter()
                    .map(|c| c.eval(batch))
                    .collect::<ExecResult<Vec<_>>>()?;
                let mut out = ColumnData::with_capacity(self.data_type, rows);
                let mut args = Vec::with_capacity(inputs.len());
                for row in 0..rows {
                    args.clear();
                    args.extend(inputs.iter().map(|input| input.value(row)));
                    let value = self.apply(&args);
                    self.push(&mut out, value)?;
                }
                Ok(out)
            }
        }
    }

    /// Row mask of a boolean expression; null counts as false
    pub fn eval_mask(&self, batch: &Batch) -> ExecResult<Vec<bool>> {
        match self.eval(batch)? {
            ColumnData::Bool(values) => Ok(values.into_iter().map(|v| v == Some(true)).collect()),
            other => Err(ExecError::invalid_value(
                &self.label,
                format!("predicate produced {}", other.logical_type()),
            )),
        }
    }

    fn push(&self, out: &mut ColumnData, value: Scalar) -> ExecResult<()> {
        out.push(value).map_err(|value| {
            ExecError::invalid_value(
                &self.label,
                format!("{} does not fit {}", value, self.data_type),
            )
        })
    }

    fn apply(&self, args: &[Scalar]) -> Scalar {
        let first = args.first().unwrap_or(&Scalar::Null);
        let second = args.get(1).unwrap_or(&Scalar::Null);
        match &self.op {
            Op::Column(_) | Op::Literal(_) => Scalar::Null,
            Op::Compare(op) => first.compare(*op, second),
            Op::And => match (first.as_bool(), second.as_bool()) {
                (Some(false), _) | (_, Some(false)) => Scalar::Bool(false),
                (Some(true), Some(true)) => Scalar::Bool(true),
                _ => Scalar::Null,
            },
            Op::Or => match (first.as_bool(), second.as_bool()) {
                (Some(true), _) | (_, Some(true)) => Scalar::Bool(true),
                (Some(false), Some(false)) => Scalar::Bool(false),
                _ => Scalar::Null,
            },
            Op::Not => first.as_bool().map_or(Scalar::Null, |b| Scalar::Bool(!b)),
            Op::IsNull => Scalar::Bool(first.is_null()),
            Op::Arith(op) => {
                let value = first.arith(*op, second);
                // Float operands mixed with integers must stay float
                match (value, self.data_type) {
                    (Scalar::Int64(v), LogicalType::Float64) => Scalar::Float64(v as f64),
                    (value, _) => value,
                }
            }
            Op::Like(regex) => match first {
                Scalar::Utf8(s) => Scalar::Bool(regex.is_match(s)),
                _ => Scalar::Null,
            },
            Op::StringFn(func) => match (func, first) {
                (StringFunc::Lower, Scalar::Utf8(s)) => Scalar::Utf8(s.to_lowercase()),
                (StringFunc::Upper, Scalar::Utf8(s)) => Scalar::Utf8(s.to_uppercase()),
                (StringFunc::Length, Scalar::Utf8(s)) => Scalar::Int64(s.chars().count() as i64),
                _ => Scalar::Null,
            },
        }
    }
}

/// Translates a SQL `LIKE` pattern into an anchored regex.
///
/// `%` matches any run of characters and `_` exactly one; everything else
/// is literal.
pub(crate) fn like_to_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let mut out = String::with_capacity(pattern.len() + 8);
    out.push_str("(?s)^");
    let mut literal = [0u8; 4];
    for ch in pattern.chars() {
        match ch {
            '%' => out.push_str(".*"),
            '_' => out.push('.'),
            other => out.push_str(&regex::escape(other.encode_utf8(&mut literal))),
        }
    }
    out.push('$');
    Regex::new(&out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::ColumnBuffer;
    use crate::planner::{col, lit};
    use crate::schema::{RawSchemaSpec, SchemaRegistry};

    fn fixture() -> (LogicalSchema, Batch) {
        let schema = SchemaRegistry::bind(
            &RawSchemaSpec::new()
                .column("n", "int32")
                .column("x", "float64")
                .column("s", "utf8"),
        )
        .unwrap();
        let batch = Batch::try_new(vec![
            ColumnBuffer::new("n", ColumnData::Int32(vec![Some(1), None, Some(3)])),
            ColumnBuffer::new("x", ColumnData::Float64(vec![Some(0.5), Some(2.0), None])),
            ColumnBuffer::new(
                "s",
                ColumnData::Utf8(vec![Some("Apple".into()), Some("a_b".into()), None]),
            ),
        ])
        .unwrap();
        (schema, batch)
    }

    #[test]
    fn test_filter_mask_treats_null_as_false() {
        let (schema, batch) = fixture();
        let expr = PhysicalExpr::compile(&col("n").gt_eq(lit(1)), &schema).unwrap();
        assert_eq!(expr.eval_mask(&batch).unwrap(), vec![true, false, true]);
    }

    #[test]
    fn test_arithmetic_column_types() {
        let (schema, batch) = fixture();
        let sum = PhysicalExpr::compile(&col("n").add(lit(1)), &schema).unwrap();
        assert_eq!(
            sum.eval(&batch).unwrap(),
            ColumnData::Int64(vec![Some(2), None, Some(4)])
        );
        let mixed = PhysicalExpr::compile(&col("n").mul(col("x")), &schema).unwrap();
        assert_eq!(
            mixed.eval(&batch).unwrap(),
            ColumnData::Float64(vec![Some(0.5), None, None])
        );
    }

    #[test]
    fn test_kleene_logic() {
        let (schema, batch) = fixture();
        let expr = PhysicalExpr::compile(
            &col("n").gt(lit(0)).or(col("x").gt(lit(1.0))),
            &schema,
        )
        .unwrap();
        assert_eq!(
            expr.eval(&batch).unwrap(),
            ColumnData::Bool(vec![Some(true), Some(true), Some(true)])
        );
        let and = PhysicalExpr::compile(&col("n").gt(lit(0)).and(col("x").gt(lit(1.0))), &schema)
            .unwrap();
        assert_eq!(
            and.eval(&batch).unwrap(),
            ColumnData::Bool(vec![Some(false), None, None])
        );
    }

    #[test]
    fn test_like_and_string_functions() {
        let (schema, batch) = fixture();
        let like = PhysicalExpr::compile(&col("s").like("a\\_%"), &schema).unwrap();
        assert_eq!(like.eval_row(&batch.row(1)), Scalar::Bool(false));
        let like = PhysicalExpr::compile(&col("s").like("a_b"), &schema).unwrap();
        assert_eq!(like.eval_row(&batch.row(1)), Scalar::Bool(true));
        assert_eq!(like.eval_row(&batch.row(2)), Scalar::Null);

        let lower = PhysicalExpr::compile(&col("s").lower(), &schema).unwrap();
        assert_eq!(lower.eval_row(&batch.row(0)), Scalar::Utf8("apple".into()));
        let len = PhysicalExpr::compile(&col("s").length(), &schema).unwrap();
        assert_eq!(
            len.eval(&batch).unwrap(),
            ColumnData::Int64(vec![Some(5), Some(3), None])
        );
    }

    #[test]
    fn test_like_escapes_regex_metacharacters() {
        let regex = like_to_regex("a.c%").unwrap();
        assert!(regex.is_match("a.cdef"));
        assert!(!regex.is_match("abc"));
    }
}

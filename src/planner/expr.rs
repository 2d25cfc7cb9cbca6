//! Expression algebra
//!
//! Expressions reference columns by name. They are type-checked against the
//! input schema of the node they are attached to when that node is built.

use std::fmt;

use crate::column::{ArithOp, CompareOp, Scalar};
use crate::schema::{LogicalSchema, LogicalType};

use super::errors::{PlanError, PlanResult};

/// String functions only the secondary engine evaluates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StringFunc {
    Lower,
    Upper,
    Length,
}

impl StringFunc {
    pub fn name(&self) -> &'static str {
        match self {
            StringFunc::Lower => "lower",
            StringFunc::Upper => "upper",
            StringFunc::Length => "length",
        }
    }
}

/// Scalar expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Column(String),
    Literal(Scalar),
    Compare {
        op: CompareOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    IsNull(Box<Expr>),
    Arith {
        op: ArithOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// SQL `LIKE` with `%` and `_` wildcards
    Like {
        expr: Box<Expr>,
        pattern: String,
    },
    StringFn {
        func: StringFunc,
        expr: Box<Expr>,
    },
}

/// Column reference
pub fn col(name: impl Into<String>) -> Expr {
    Expr::Column(name.into())
}

/// Literal value
pub fn lit(value: impl Into<Scalar>) -> Expr {
    Expr::Literal(value.into())
}

impl Expr {
    fn compare(self, op: CompareOp, other: Expr) -> Expr {
        Expr::Compare {
            op,
            left: Box::new(self),
            right: Box::new(other),
        }
    }

    fn arith(self, op: ArithOp, other: Expr) -> Expr {
        Expr::Arith {
            op,
            left: Box::new(self),
            right: Box::new(other),
        }
    }

    pub fn eq(self, other: Expr) -> Expr {
        self.compare(CompareOp::Eq, other)
    }

    pub fn not_eq(self, other: Expr) -> Expr {
        self.compare(CompareOp::NotEq, other)
    }

    pub fn lt(self, other: Expr) -> Expr {
        self.compare(CompareOp::Lt, other)
    }

    pub fn lt_eq(self, other: Expr) -> Expr {
        self.compare(CompareOp::LtEq, other)
    }

    pub fn gt(self, other: Expr) -> Expr {
        self.compare(CompareOp::Gt, other)
    }

    pub fn gt_eq(self, other: Expr) -> Expr {
        self.compare(CompareOp::GtEq, other)
    }

    pub fn and(self, other: Expr) -> Expr {
        Expr::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Expr) -> Expr {
        Expr::Or(Box::new(self), Box::new(other))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Expr {
        Expr::Not(Box::new(self))
    }

    pub fn is_null(self) -> Expr {
        Expr::IsNull(Box::new(self))
    }

    pub fn is_not_null(self) -> Expr {
        self.is_null().not()
    }

    #[allow(clippy::should_implement_trait)]
    pub fn add(self, other: Expr) -> Expr {
        self.arith(ArithOp::Add, other)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn sub(self, other: Expr) -> Expr {
        self.arith(ArithOp::Sub, other)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn mul(self, other: Expr) -> Expr {
        self.arith(ArithOp::Mul, other)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn div(self, other: Expr) -> Expr {
        self.arith(ArithOp::Div, other)
    }

    pub fn like(self, pattern: impl Into<String>) -> Expr {
        Expr::Like {
            expr: Box::new(self),
            pattern: pattern.into(),
        }
    }

    pub fn lower(self) -> Expr {
        self.string_fn(StringFunc::Lower)
    }

    pub fn upper(self) -> Expr {
        self.string_fn(StringFunc::Upper)
    }

    pub fn length(self) -> Expr {
        self.string_fn(StringFunc::Length)
    }

    fn string_fn(self, func: StringFunc) -> Expr {
        Expr::StringFn {
            func,
            expr: Box::new(self),
        }
    }

    /// Names the expression's output column
    pub fn alias(self, name: impl Into<String>) -> NamedExpr {
        NamedExpr {
            expr: self,
            name: name.into(),
        }
    }

    /// Column names referenced anywhere in the expression, in first-seen order
    pub fn columns(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns(&self, out: &mut Vec<String>) {
        match self {
            Expr::Column(name) => {
                if !out.contains(name) {
                    out.push(name.clone());
                }
            }
            Expr::Literal(_) => {}
            Expr::Compare { left, right, .. }
            | Expr::Arith { left, right, .. }
            | Expr::And(left, right)
            | Expr::Or(left, right) => {
                left.collect_columns(out);
                right.collect_columns(out);
            }
            Expr::Not(inner)
            | Expr::IsNull(inner)
            | Expr::Like { expr: inner, .. }
            | Expr::StringFn { expr: inner, .. } => inner.collect_columns(out),
        }
    }

    /// First construct in the expression the given predicate rejects
    pub(crate) fn find_construct(&self, reject: &dyn Fn(&Expr) -> Option<String>) -> Option<String> {
        if let Some(construct) = reject(self) {
            return Some(construct);
        }
        match self {
            Expr::Column(_) | Expr::Literal(_) => None,
            Expr::Compare { left, right, .. }
            | Expr::Arith { left, right, .. }
            | Expr::And(left, right)
            | Expr::Or(left, right) => left
                .find_construct(reject)
                .or_else(|| right.find_construct(reject)),
            Expr::Not(inner)
            | Expr::IsNull(inner)
            | Expr::Like { expr: inner, .. }
            | Expr::StringFn { expr: inner, .. } => inner.find_construct(reject),
        }
    }

    /// Output name when no alias is given
    pub fn default_name(&self) -> String {
        match self {
            Expr::Column(name) => name.clone(),
            other => other.to_string(),
        }
    }

    /// Type-checks the expression against `schema` and returns its type
    pub fn data_type(&self, schema: &LogicalSchema) -> PlanResult<LogicalType> {
        match self {
            Expr::Column(name) => schema
                .field(name)
                .map(|f| f.logical_type)
                .ok_or_else(|| PlanError::unknown_column(name)),
            Expr::Literal(value) => value.logical_type().ok_or_else(|| {
                PlanError::type_mismatch(self, "null literal has no type; use is_null()")
            }),
            Expr::Compare { left, right, .. } => {
                let l = left.data_type(schema)?;
                let r = right.data_type(schema)?;
                if comparable(l, r) {
                    Ok(LogicalType::Bool)
                } else {
                    Err(PlanError::type_mismatch(
                        self,
                        format!("cannot compare {} with {}", l, r),
                    ))
                }
            }
            Expr::And(left, right) | Expr::Or(left, right) => {
                self.expect(left, schema, LogicalType::Bool)?;
                self.expect(right, schema, LogicalType::Bool)?;
                Ok(LogicalType::Bool)
            }
            Expr::Not(inner) => {
                self.expect(inner, schema, LogicalType::Bool)?;
                Ok(LogicalType::Bool)
            }
            Expr::IsNull(inner) => {
                inner.data_type(schema)?;
                Ok(LogicalType::Bool)
            }
            Expr::Arith { op, left, right } => {
                let l = left.data_type(schema)?;
                let r = right.data_type(schema)?;
                if !l.is_numeric() || !r.is_numeric() {
                    return Err(PlanError::type_mismatch(
                        self,
                        format!("arithmetic needs numeric operands, got {} and {}", l, r),
                    ));
                }
                Ok(arith_result_type(*op, l, r))
            }
            Expr::Like { expr, .. } => {
                self.expect(expr, schema, LogicalType::Utf8)?;
                Ok(LogicalType::Bool)
            }
            Expr::StringFn { func, expr } => {
                self.expect(expr, schema, LogicalType::Utf8)?;
                Ok(match func {
                    StringFunc::Lower | StringFunc::Upper => LogicalType::Utf8,
                    StringFunc::Length => LogicalType::Int64,
                })
            }
        }
    }

    fn expect(&self, operand: &Expr, schema: &LogicalSchema, expected: LogicalType) -> PlanResult<()> {
        let actual = operand.data_type(schema)?;
        if actual == expected {
            Ok(())
        } else {
            Err(PlanError::type_mismatch(
                self,
                format!("expected {} operand, got {} for {}", expected, actual, operand),
            ))
        }
    }

    /// Splits a predicate into its top-level conjuncts
    pub fn conjuncts(&self) -> Vec<&Expr> {
        match self {
            Expr::And(left, right) => {
                let mut out = left.conjuncts();
                out.extend(right.conjuncts());
                out
            }
            other => vec![other],
        }
    }

    /// `(column, op, literal)` if this is a column/literal comparison,
    /// normalized so the column is on the left
    pub fn as_column_comparison(&self) -> Option<(&str, CompareOp, &Scalar)> {
        match self {
            Expr::Compare { op, left, right } => match (left.as_ref(), right.as_ref()) {
                (Expr::Column(c), Expr::Literal(v)) => Some((c, *op, v)),
                (Expr::Literal(v), Expr::Column(c)) => Some((c, op.flip(), v)),
                _ => None,
            },
            _ => None,
        }
    }
}

/// True if values of the two types can be compared
pub(crate) fn comparable(a: LogicalType, b: LogicalType) -> bool {
    a == b || (a.is_numeric() && b.is_numeric())
}

/// Result type of arithmetic: division is always float64, any float
/// operand makes the result float64, integer arithmetic runs in int64.
pub(crate) fn arith_result_type(op: ArithOp, left: LogicalType, right: LogicalType) -> LogicalType {
    if op == ArithOp::Div || left == LogicalType::Float64 || right == LogicalType::Float64 {
        LogicalType::Float64
    } else {
        LogicalType::Int64
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Column(name) => write!(f, "{}", name),
            Expr::Literal(value) => write!(f, "{}", value),
            Expr::Compare { op, left, right } => write!(f, "({} {} {})", left, op.symbol(), right),
            Expr::And(left, right) => write!(f, "({} AND {})", left, right),
            Expr::Or(left, right) => write!(f, "({} OR {})", left, right),
            Expr::Not(inner) => write!(f, "NOT {}", inner),
            Expr::IsNull(inner) => write!(f, "{} IS NULL", inner),
            Expr::Arith { op, left, right } => write!(f, "({} {} {})", left, op.symbol(), right),
            Expr::Like { expr, pattern } => write!(f, "{} LIKE '{}'", expr, pattern),
            Expr::StringFn { func, expr } => write!(f, "{}({})", func.name(), expr),
        }
    }
}

/// Expression with an output column name
#[derive(Debug, Clone, PartialEq)]
pub struct NamedExpr {
    pub expr: Expr,
    pub name: String,
}

impl From<Expr> for NamedExpr {
    fn from(expr: Expr) -> Self {
        let name = expr.default_name();
        Self { expr, name }
    }
}

impl fmt::Display for NamedExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.expr {
            Expr::Column(c) if *c == self.name => write!(f, "{}", c),
            expr => write!(f, "{} AS {}", expr, self.name),
        }
    }
}

/// Aggregate functions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggFunc {
    /// Non-null input values
    Count,
    /// Input rows
    CountStar,
    Sum,
    Mean,
    Min,
    Max,
    /// Distinct non-null input values
    DistinctCount,
}

impl AggFunc {
    pub fn name(&self) -> &'static str {
        match self {
            AggFunc::Count | AggFunc::CountStar => "count",
            AggFunc::Sum => "sum",
            AggFunc::Mean => "mean",
            AggFunc::Min => "min",
            AggFunc::Max => "max",
            AggFunc::DistinctCount => "distinct_count",
        }
    }
}

/// One aggregate of an aggregate node
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateExpr {
    pub func: AggFunc,
    /// `None` only for `count(*)`
    pub input: Option<Expr>,
    pub name: String,
}

impl AggregateExpr {
    fn new(func: AggFunc, input: Expr) -> Self {
        let name = format!("{}({})", func.name(), input);
        Self {
            func,
            input: Some(input),
            name,
        }
    }

    pub fn count(input: Expr) -> Self {
        Self::new(AggFunc::Count, input)
    }

    pub fn count_star() -> Self {
        Self {
            func: AggFunc::CountStar,
            input: None,
            name: "count(*)".to_string(),
        }
    }

    pub fn sum(input: Expr) -> Self {
        Self::new(AggFunc::Sum, input)
    }

    pub fn mean(input: Expr) -> Self {
        Self::new(AggFunc::Mean, input)
    }

    pub fn min(input: Expr) -> Self {
        Self::new(AggFunc::Min, input)
    }

    pub fn max(input: Expr) -> Self {
        Self::new(AggFunc::Max, input)
    }

    pub fn distinct_count(input: Expr) -> Self {
        Self::new(AggFunc::DistinctCount, input)
    }

    pub fn alias(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Type-checks the input and returns the output type
    pub fn data_type(&self, schema: &LogicalSchema) -> PlanResult<LogicalType> {
        let input_type = match &self.input {
            Some(expr) => Some(expr.data_type(schema)?),
            None => None,
        };
        match (self.func, input_type) {
            (AggFunc::CountStar, _) | (AggFunc::Count, _) | (AggFunc::DistinctCount, _) => {
                Ok(LogicalType::Int64)
            }
            (AggFunc::Sum, Some(LogicalType::Float64)) => Ok(LogicalType::Float64),
            (AggFunc::Sum, Some(LogicalType::Int32 | LogicalType::Int64)) => Ok(LogicalType::Int64),
            (AggFunc::Mean, Some(t)) if t.is_numeric() => Ok(LogicalType::Float64),
            (AggFunc::Min | AggFunc::Max, Some(t)) => Ok(t),
            (func, Some(t)) => Err(PlanError::type_mismatch(
                self,
                format!("{} is not defined for {}", func.name(), t),
            )),
            (func, None) => Err(PlanError::invalid(format!("{} requires an input", func.name()))),
        }
    }
}

impl fmt::Display for AggregateExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let call = match &self.input {
            Some(input) => format!("{}({})", self.func.name(), input),
            None => "count(*)".to_string(),
        };
        if call == self.name {
            write!(f, "{}", call)
        } else {
            write!(f, "{} AS {}", call, self.name)
        }
    }
}

/// Sort key over an input column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub column: String,
    pub descending: bool,
}

impl SortKey {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: false,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: true,
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}",
            self.column,
            if self.descending { "DESC" } else { "ASC" }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{RawSchemaSpec, SchemaRegistry};

    fn schema() -> LogicalSchema {
        SchemaRegistry::bind(
            &RawSchemaSpec::new()
                .column("id", "int32")
                .column("amount", "float64")
                .column("name", "utf8")
                .column("day", "date"),
        )
        .unwrap()
    }

    #[test]
    fn test_comparison_types() {
        let s = schema();
        assert_eq!(
            col("id").gt(lit(5i64)).data_type(&s).unwrap(),
            LogicalType::Bool
        );
        let err = col("name").eq(lit(1)).data_type(&s).unwrap_err();
        assert_eq!(err.code(), "STRATA_PLAN_TYPE_MISMATCH");
    }

    #[test]
    fn test_unknown_column_named() {
        let err = col("missing").is_null().data_type(&schema()).unwrap_err();
        assert_eq!(
            err,
            PlanError::UnknownColumn {
                column: "missing".into()
            }
        );
    }

    #[test]
    fn test_arithmetic_result_types() {
        let s = schema();
        assert_eq!(col("id").add(lit(1)).data_type(&s).unwrap(), LogicalType::Int64);
        assert_eq!(col("id").div(lit(2)).data_type(&s).unwrap(), LogicalType::Float64);
        assert_eq!(
            col("id").mul(col("amount")).data_type(&s).unwrap(),
            LogicalType::Float64
        );
        assert!(col("day").add(lit(1)).data_type(&s).is_err());
    }

    #[test]
    fn test_null_literal_rejected() {
        assert!(col("id").eq(lit(Scalar::Null)).data_type(&schema()).is_err());
    }

    #[test]
    fn test_string_functions() {
        let s = schema();
        assert_eq!(col("name").length().data_type(&s).unwrap(), LogicalType::Int64);
        assert_eq!(col("name").like("a%").data_type(&s).unwrap(), LogicalType::Bool);
        assert!(col("id").lower().data_type(&s).is_err());
    }

    #[test]
    fn test_aggregate_types() {
        let s = schema();
        assert_eq!(
            AggregateExpr::sum(col("id")).data_type(&s).unwrap(),
            LogicalType::Int64
        );
        assert_eq!(
            AggregateExpr::mean(col("id")).data_type(&s).unwrap(),
            LogicalType::Float64
        );
        assert_eq!(
            AggregateExpr::max(col("day")).data_type(&s).unwrap(),
            LogicalType::Date
        );
        assert!(AggregateExpr::sum(col("name")).data_type(&s).is_err());
        assert_eq!(AggregateExpr::count_star().name, "count(*)");
    }

    #[test]
    fn test_conjuncts_and_comparisons() {
        let predicate = col("id").gt(lit(1)).and(lit(10).gt_eq(col("id")));
        let conjuncts = predicate.conjuncts();
        assert_eq!(conjuncts.len(), 2);
        let (column, op, value) = conjuncts[1].as_column_comparison().unwrap();
        assert_eq!(column, "id");
        assert_eq!(op, CompareOp::LtEq);
        assert_eq!(value, &Scalar::Int32(10));
    }

    #[test]
    fn test_display() {
        let e = col("amount").mul(lit(2)).gt(lit(10.5));
        assert_eq!(e.to_string(), "((amount * 2) > 10.5)");
        assert_eq!(AggregateExpr::sum(col("amount")).alias("total").to_string(), "sum(amount) AS total");
    }
}

//! Single typed values
//!
//! `Scalar` is the value representation shared by expression evaluation,
//! column statistics, group keys and the row-oriented secondary engine.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, NaiveDate};

use crate::schema::LogicalType;

/// Days between 0001-01-01 (CE day 1) and 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

pub(crate) const MICROS_PER_DAY: i64 = 86_400_000_000;

/// A single, possibly null, value of a logical type
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Int32(i32),
    Int64(i64),
    Float64(f64),
    Utf8(String),
    Bool(bool),
    /// Days since 1970-01-01
    Date(i32),
    /// Microseconds since 1970-01-01T00:00:00 UTC
    Timestamp(i64),
}

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl CompareOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::NotEq => "!=",
            CompareOp::Lt => "<",
            CompareOp::LtEq => "<=",
            CompareOp::Gt => ">",
            CompareOp::GtEq => ">=",
        }
    }

    /// The operator with its operands swapped (`a < b` == `b > a`)
    pub fn flip(&self) -> Self {
        match self {
            CompareOp::Eq => CompareOp::Eq,
            CompareOp::NotEq => CompareOp::NotEq,
            CompareOp::Lt => CompareOp::Gt,
            CompareOp::LtEq => CompareOp::GtEq,
            CompareOp::Gt => CompareOp::Lt,
            CompareOp::GtEq => CompareOp::LtEq,
        }
    }

    fn holds(&self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Eq => ordering == Ordering::Equal,
            CompareOp::NotEq => ordering != Ordering::Equal,
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::LtEq => ordering != Ordering::Greater,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::GtEq => ordering != Ordering::Less,
        }
    }
}

/// Arithmetic operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl ArithOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
        }
    }
}

impl Scalar {
    /// Builds a date scalar from a calendar date
    pub fn date(year: i32, month: u32, day: u32) -> Option<Scalar> {
        NaiveDate::from_ymd_opt(year, month, day).map(|d| Scalar::Date(date_to_days(d)))
    }

    /// Logical type of the value, `None` for null
    pub fn logical_type(&self) -> Option<LogicalType> {
        match self {
            Scalar::Null => None,
            Scalar::Int32(_) => Some(LogicalType::Int32),
            Scalar::Int64(_) => Some(LogicalType::Int64),
            Scalar::Float64(_) => Some(LogicalType::Float64),
            Scalar::Utf8(_) => Some(LogicalType::Utf8),
            Scalar::Bool(_) => Some(LogicalType::Bool),
            Scalar::Date(_) => Some(LogicalType::Date),
            Scalar::Timestamp(_) => Some(LogicalType::Timestamp),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    /// Integer value of integer scalars
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Scalar::Int32(v) => Some(*v as i64),
            Scalar::Int64(v) => Some(*v),
            _ => None,
        }
    }

    /// Floating point value of numeric scalars
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Int32(v) => Some(*v as f64),
            Scalar::Int64(v) => Some(*v as f64),
            Scalar::Float64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Scalar::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::Utf8(s) => Some(s),
            _ => None,
        }
    }

    /// SQL-style ordering: `None` if either side is null or the types are
    /// not comparable. Integers of different widths compare exactly, any
    /// other numeric mix compares as f64.
    pub fn sql_cmp(&self, other: &Scalar) -> Option<Ordering> {
        match (self, other) {
            (Scalar::Null, _) | (_, Scalar::Null) => None,
            (Scalar::Utf8(a), Scalar::Utf8(b)) => Some(a.cmp(b)),
            (Scalar::Bool(a), Scalar::Bool(b)) => Some(a.cmp(b)),
            (Scalar::Date(a), Scalar::Date(b)) => Some(a.cmp(b)),
            (Scalar::Timestamp(a), Scalar::Timestamp(b)) => Some(a.cmp(b)),
            (a, b) => match (a.as_i64(), b.as_i64()) {
                (Some(x), Some(y)) => Some(x.cmp(&y)),
                _ => match (a.as_f64(), b.as_f64()) {
                    (Some(x), Some(y)) => x.partial_cmp(&y),
                    _ => None,
                },
            },
        }
    }

    /// Evaluates a comparison. Null when either side is null.
    pub fn compare(&self, op: CompareOp, other: &Scalar) -> Scalar {
        if self.is_null() || other.is_null() {
            return Scalar::Null;
        }
        match self.sql_cmp(other) {
            Some(ordering) => Scalar::Bool(op.holds(ordering)),
            // Incomparable floats (NaN) are never equal to anything
            None => Scalar::Bool(op == CompareOp::NotEq),
        }
    }

    /// Evaluates arithmetic.
    ///
    /// Integer arithmetic is performed in i64. Division always produces
    /// float64. Overflow and division by zero produce null.
    pub fn arith(&self, op: ArithOp, other: &Scalar) -> Scalar {
        if self.is_null() || other.is_null() {
            return Scalar::Null;
        }
        if let (Some(a), Some(b)) = (self.as_i64(), other.as_i64()) {
            let checked = match op {
                ArithOp::Add => Some(a.checked_add(b)),
                ArithOp::Sub => Some(a.checked_sub(b)),
                ArithOp::Mul => Some(a.checked_mul(b)),
                ArithOp::Div => None,
            };
            if let Some(result) = checked {
                return result.map(Scalar::Int64).unwrap_or(Scalar::Null);
            }
        }
        match (self.as_f64(), other.as_f64()) {
            (Some(a), Some(b)) => match op {
                ArithOp::Add => Scalar::Float64(a + b),
                ArithOp::Sub => Scalar::Float64(a - b),
                ArithOp::Mul => Scalar::Float64(a * b),
                ArithOp::Div if b == 0.0 => Scalar::Null,
                ArithOp::Div => Scalar::Float64(a / b),
            },
            _ => Scalar::Null,
        }
    }

    /// Total order used for sorting and for deterministic group output.
    ///
    /// Nulls sort first. Floats use IEEE total ordering. Values of
    /// different types order by type rank.
    pub fn total_cmp(&self, other: &Scalar) -> Ordering {
        match (self, other) {
            (Scalar::Null, Scalar::Null) => Ordering::Equal,
            (Scalar::Null, _) => Ordering::Less,
            (_, Scalar::Null) => Ordering::Greater,
            (Scalar::Float64(a), Scalar::Float64(b)) => a.total_cmp(b),
            (a, b) => match a.sql_cmp(b) {
                Some(ordering) => ordering,
                None => a.type_rank().cmp(&b.type_rank()),
            },
        }
    }

    fn type_rank(&self) -> u8 {
        match self {
            Scalar::Null => 0,
            Scalar::Bool(_) => 1,
            Scalar::Int32(_) | Scalar::Int64(_) | Scalar::Float64(_) => 2,
            Scalar::Utf8(_) => 3,
            Scalar::Date(_) => 4,
            Scalar::Timestamp(_) => 5,
        }
    }

    /// Approximate heap + inline size in bytes
    pub fn byte_size(&self) -> usize {
        match self {
            Scalar::Utf8(s) => std::mem::size_of::<Scalar>() + s.len(),
            _ => std::mem::size_of::<Scalar>(),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => write!(f, "NULL"),
            Scalar::Int32(v) => write!(f, "{}", v),
            Scalar::Int64(v) => write!(f, "{}", v),
            Scalar::Float64(v) => write!(f, "{}", v),
            Scalar::Utf8(s) => write!(f, "'{}'", s),
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Date(days) => match days_to_date(*days) {
                Some(d) => write!(f, "{}", d.format("%Y-%m-%d")),
                None => write!(f, "date({})", days),
            },
            Scalar::Timestamp(micros) => match DateTime::from_timestamp_micros(*micros) {
                Some(ts) => write!(f, "{}", ts.naive_utc().format("%Y-%m-%d %H:%M:%S%.6f")),
                None => write!(f, "timestamp({})", micros),
            },
        }
    }
}

impl From<i32> for Scalar {
    fn from(v: i32) -> Self {
        Scalar::Int32(v)
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Scalar::Int64(v)
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Scalar::Float64(v)
    }
}

impl From<bool> for Scalar {
    fn from(v: bool) -> Self {
        Scalar::Bool(v)
    }
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Scalar::Utf8(v.to_string())
    }
}

impl From<String> for Scalar {
    fn from(v: String) -> Self {
        Scalar::Utf8(v)
    }
}

impl<T: Into<Scalar>> From<Option<T>> for Scalar {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Scalar::Null)
    }
}

/// Converts a calendar date to days since the Unix epoch
pub fn date_to_days(date: NaiveDate) -> i32 {
    use chrono::Datelike;
    date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE
}

/// Converts days since the Unix epoch to a calendar date
pub fn days_to_date(days: i32) -> Option<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(days.checked_add(UNIX_EPOCH_DAYS_FROM_CE)?)
}

/// Microseconds since the epoch at midnight of the given day, or `None`
/// when that instant is outside the timestamp range
pub fn days_to_timestamp_micros(days: i32) -> Option<i64> {
    i64::from(days).checked_mul(MICROS_PER_DAY)
}

/// Hashable projection of a scalar, used for group keys and distinct sets.
///
/// Integers of both widths share a representation; floats are keyed by
/// their bit pattern with `-0.0` folded into `0.0` and all NaNs folded
/// into one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ScalarKey {
    Null,
    Int(i64),
    Float(u64),
    Utf8(String),
    Bool(bool),
    Date(i32),
    Timestamp(i64),
}

impl ScalarKey {
    /// Converts back to a scalar of the given type
    pub fn to_scalar(&self, logical_type: LogicalType) -> Scalar {
        match (self, logical_type) {
            (ScalarKey::Null, _) => Scalar::Null,
            (ScalarKey::Int(v), LogicalType::Int32) => Scalar::Int32(*v as i32),
            (ScalarKey::Int(v), _) => Scalar::Int64(*v),
            (ScalarKey::Float(bits), _) => Scalar::Float64(f64::from_bits(*bits)),
            (ScalarKey::Utf8(s), _) => Scalar::Utf8(s.clone()),
            (ScalarKey::Bool(b), _) => Scalar::Bool(*b),
            (ScalarKey::Date(d), _) => Scalar::Date(*d),
            (ScalarKey::Timestamp(t), _) => Scalar::Timestamp(*t),
        }
    }
}

impl From<&Scalar> for ScalarKey {
    fn from(value: &Scalar) -> Self {
        match value {
            Scalar::Null => ScalarKey::Null,
            Scalar::Int32(v) => ScalarKey::Int(*v as i64),
            Scalar::Int64(v) => ScalarKey::Int(*v),
            Scalar::Float64(v) => {
                let normalized = if *v == 0.0 {
                    0.0f64
                } else if v.is_nan() {
                    f64::NAN
                } else {
                    *v
                };
                ScalarKey::Float(normalized.to_bits())
            }
            Scalar::Utf8(s) => ScalarKey::Utf8(s.clone()),
            Scalar::Bool(b) => ScalarKey::Bool(*b),
            Scalar::Date(d) => ScalarKey::Date(*d),
            Scalar::Timestamp(t) => ScalarKey::Timestamp(*t),
        }
    }
}

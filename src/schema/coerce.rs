//! Physical to logical coercion
//!
//! Coercion only widens. Allowed pairs:
//!
//! | physical          | logical                                   |
//! |-------------------|-------------------------------------------|
//! | int32             | int32, int64, float64                     |
//! | int64             | int64                                     |
//! | float32           | float64                                   |
//! | float64           | float64                                   |
//! | bool              | bool                                      |
//! | utf8              | utf8, and parsed: int32 int64 float64 bool date timestamp |
//! | bytes             | utf8 (valid UTF-8), and parsed as utf8    |
//! | date32            | date, timestamp (midnight UTC)            |
//! | timestamp_micros  | timestamp                                 |
//!
//! Every other pair is rejected before any value is looked at.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::column::{date_to_days, days_to_timestamp_micros, ColumnData};
use crate::storage::{PhysicalColumn, PhysicalType};

use super::errors::{SchemaError, SchemaResult};
use super::types::LogicalType;

/// What to do with a text value that does not parse as the target type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoercionMode {
    /// Fail the partition, naming column and row
    #[default]
    Strict,
    /// Replace the value with null
    BestEffort,
}

/// Returns true if values of `physical` may be coerced to `target`
pub fn is_coercible(physical: PhysicalType, target: LogicalType) -> bool {
    use LogicalType as L;
    use PhysicalType as P;
    match physical {
        P::Int32 => matches!(target, L::Int32 | L::Int64 | L::Float64),
        P::Int64 => target == L::Int64,
        P::Float32 | P::Float64 => target == L::Float64,
        P::Bool => target == L::Bool,
        P::Utf8 | P::Bytes => true,
        P::Date32 => matches!(target, L::Date | L::Timestamp),
        P::TimestampMicros => target == L::Timestamp,
    }
}

/// Coerces a decoded chunk to a logical type
pub fn coerce_column(
    column: &str,
    physical: PhysicalColumn,
    target: LogicalType,
    mode: CoercionMode,
) -> SchemaResult<ColumnData> {
    let physical_type = physical.physical_type();
    let incompatible = |reason: String| SchemaError::IncompatibleType {
        column: column.to_string(),
        physical: physical_type.name().to_string(),
        target: target.type_name().to_string(),
        reason,
    };
    if !is_coercible(physical_type, target) {
        return Err(incompatible("narrowing or unrelated types".to_string()));
    }

    let data = match (physical, target) {
        (PhysicalColumn::Int32(v), LogicalType::Int32) => ColumnData::Int32(v),
        (PhysicalColumn::Int32(v), LogicalType::Int64) => {
            ColumnData::Int64(v.into_iter().map(|x| x.map(i64::from)).collect())
        }
        (PhysicalColumn::Int32(v), LogicalType::Float64) => {
            ColumnData::Float64(v.into_iter().map(|x| x.map(f64::from)).collect())
        }
        (PhysicalColumn::Int64(v), LogicalType::Int64) => ColumnData::Int64(v),
        (PhysicalColumn::Float32(v), LogicalType::Float64) => {
            ColumnData::Float64(v.into_iter().map(|x| x.map(f64::from)).collect())
        }
        (PhysicalColumn::Float64(v), LogicalType::Float64) => ColumnData::Float64(v),
        (PhysicalColumn::Bool(v), LogicalType::Bool) => ColumnData::Bool(v),
        (PhysicalColumn::Date32(v), LogicalType::Date) => ColumnData::Date(v),
        (PhysicalColumn::Date32(v), LogicalType::Timestamp) => {
            let mut out = Vec::with_capacity(v.len());
            for (row, value) in v.into_iter().enumerate() {
                match value.map(|days| (days, days_to_timestamp_micros(days))) {
                    None => out.push(None),
                    Some((_, Some(micros))) => out.push(Some(micros)),
                    Some(_) if mode == CoercionMode::BestEffort => out.push(None),
                    Some((days, None)) => {
                        return Err(incompatible(format!(
                            "row {}: day {} is outside the timestamp range",
                            row, days
                        )))
                    }
                }
            }
            ColumnData::Timestamp(out)
        }
        (PhysicalColumn::TimestampMicros(v), LogicalType::Timestamp) => ColumnData::Timestamp(v),
        (PhysicalColumn::Utf8(v), target) => parse_text(v, target, mode).map_err(incompatible)?,
        (PhysicalColumn::Bytes(v), target) => {
            let mut texts = Vec::with_capacity(v.len());
            for (row, value) in v.into_iter().enumerate() {
                match value.map(String::from_utf8).transpose() {
                    Ok(text) => texts.push(text),
                    Err(_) if mode == CoercionMode::BestEffort => texts.push(None),
                    Err(e) => {
                        return Err(incompatible(format!("row {}: invalid UTF-8: {}", row, e)))
                    }
                }
            }
            parse_text(texts, target, mode).map_err(incompatible)?
        }
        (other, _) => {
            return Err(incompatible(format!(
                "no conversion from {}",
                other.physical_type()
            )))
        }
    };
    Ok(data)
}

fn parse_text(
    values: Vec<Option<String>>,
    target: LogicalType,
    mode: CoercionMode,
) -> Result<ColumnData, String> {
    fn parse_all<T>(
        values: Vec<Option<String>>,
        mode: CoercionMode,
        target: LogicalType,
        parse: impl Fn(&str) -> Option<T>,
    ) -> Result<Vec<Option<T>>, String> {
        let mut out = Vec::with_capacity(values.len());
        for (row, value) in values.into_iter().enumerate() {
            match value {
                None => out.push(None),
                Some(text) => match parse(text.trim()) {
                    Some(parsed) => out.push(Some(parsed)),
                    None if mode == CoercionMode::BestEffort => out.push(None),
                    None => {
                        return Err(format!(
                            "row {}: '{}' is not a valid {}",
                            row, text, target
                        ))
                    }
                },
            }
        }
        Ok(out)
    }

    Ok(match target {
        LogicalType::Utf8 => ColumnData::Utf8(values),
        LogicalType::Int32 => ColumnData::Int32(parse_all(values, mode, target, |s| s.parse().ok())?),
        LogicalType::Int64 => ColumnData::Int64(parse_all(values, mode, target, |s| s.parse().ok())?),
        LogicalType::Float64 => {
            ColumnData::Float64(parse_all(values, mode, target, |s| s.parse().ok())?)
        }
        LogicalType::Bool => ColumnData::Bool(parse_all(values, mode, target, parse_bool)?),
        LogicalType::Date => ColumnData::Date(parse_all(values, mode, target, parse_date)?),
        LogicalType::Timestamp => {
            ColumnData::Timestamp(parse_all(values, mode, target, parse_timestamp)?)
        }
    })
}

fn parse_bool(text: &str) -> Option<bool> {
    match text.to_ascii_lowercase().as_str() {
        "true" | "t" | "1" => Some(true),
        "false" | "f" | "0" => Some(false),
        _ => None,
    }
}

fn parse_date(text: &str) -> Option<i32> {
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .map(date_to_days)
}

/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS[.f]`, the same with a `T`
/// separator, and a bare date (midnight UTC).
fn parse_timestamp(text: &str) -> Option<i64> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.timestamp_micros());
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(text, format) {
            return Some(ts.and_utc().timestamp_micros());
        }
    }
    parse_date(text).and_then(days_to_timestamp_micros)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int32_widens_to_int64_and_float64() {
        let physical = PhysicalColumn::Int32(vec![Some(-3), None, Some(i32::MAX)]);
        let widened =
            coerce_column("n", physical.clone(), LogicalType::Int64, CoercionMode::Strict).unwrap();
        assert_eq!(
            widened,
            ColumnData::Int64(vec![Some(-3), None, Some(i32::MAX as i64)])
        );
        let as_float =
            coerce_column("n", physical, LogicalType::Float64, CoercionMode::Strict).unwrap();
        assert_eq!(as_float.value(0), crate::column::Scalar::Float64(-3.0));
    }

    #[test]
    fn test_narrowing_is_rejected() {
        let err = coerce_column(
            "n",
            PhysicalColumn::Int64(vec![Some(1)]),
            LogicalType::Int32,
            CoercionMode::Strict,
        )
        .unwrap_err();
        assert_eq!(err.code(), "STRATA_SCHEMA_INCOMPATIBLE_TYPE");
        assert!(!is_coercible(PhysicalType::Int64, LogicalType::Float64));
        assert!(!is_coercible(PhysicalType::Float64, LogicalType::Int64));
        assert!(!is_coercible(PhysicalType::TimestampMicros, LogicalType::Date));
    }

    #[test]
    fn test_text_parse_failure_names_row() {
        let err = coerce_column(
            "price",
            PhysicalColumn::Utf8(vec![Some("1.5".into()), Some("abc".into())]),
            LogicalType::Float64,
            CoercionMode::Strict,
        )
        .unwrap_err();
        assert_eq!(err.column(), Some("price"));
        assert!(err.to_string().contains("row 1"));
    }

    #[test]
    fn test_best_effort_nulls_unparseable_values() {
        let data = coerce_column(
            "price",
            PhysicalColumn::Utf8(vec![Some(" 2 ".into()), Some("abc".into()), None]),
            LogicalType::Int64,
            CoercionMode::BestEffort,
        )
        .unwrap();
        assert_eq!(data, ColumnData::Int64(vec![Some(2), None, None]));
    }

    #[test]
    fn test_date32_to_timestamp_is_midnight() {
        let data = coerce_column(
            "d",
            PhysicalColumn::Date32(vec![Some(1)]),
            LogicalType::Timestamp,
            CoercionMode::Strict,
        )
        .unwrap();
        assert_eq!(data, ColumnData::Timestamp(vec![Some(86_400_000_000)]));
    }

    #[test]
    fn test_date32_outside_timestamp_range() {
        let physical = PhysicalColumn::Date32(vec![Some(0), None, Some(i32::MAX)]);
        let err = coerce_column("d", physical.clone(), LogicalType::Timestamp, CoercionMode::Strict)
            .unwrap_err();
        assert_eq!(err.code(), "STRATA_SCHEMA_INCOMPATIBLE_TYPE");
        assert!(err.to_string().contains("row 2"));

        let data =
            coerce_column("d", physical, LogicalType::Timestamp, CoercionMode::BestEffort).unwrap();
        assert_eq!(data, ColumnData::Timestamp(vec![Some(0), None, None]));
    }

    #[test]
    fn test_text_dates_and_timestamps() {
        assert_eq!(parse_date("1970-01-02"), Some(1));
        assert_eq!(parse_timestamp("1970-01-01T00:00:01Z"), Some(1_000_000));
        assert_eq!(parse_timestamp("1970-01-01 00:00:00.5"), Some(500_000));
        assert_eq!(parse_timestamp("1970-01-02"), Some(86_400_000_000));
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn test_bytes_must_be_utf8() {
        let err = coerce_column(
            "b",
            PhysicalColumn::Bytes(vec![Some(vec![0xff, 0xfe])]),
            LogicalType::Utf8,
            CoercionMode::Strict,
        )
        .unwrap_err();
        assert!(err.to_string().contains("UTF-8"));
        let ok = coerce_column(
            "b",
            PhysicalColumn::Bytes(vec![Some(b"hi".to_vec())]),
            LogicalType::Utf8,
            CoercionMode::Strict,
        )
        .unwrap();
        assert_eq!(ok, ColumnData::Utf8(vec![Some("hi".into())]));
    }
}

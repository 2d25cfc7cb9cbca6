//! Per-partition column statistics

use std::cmp::Ordering;

use hashbrown::HashMap;

use crate::column::{Batch, ColumnBuffer, CompareOp, Scalar};

/// Minimum, maximum and null count of one column in one partition.
///
/// `min` and `max` are null when the column holds no comparable values.
/// NaN never participates in `min` or `max`.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnStats {
    pub min: Scalar,
    pub max: Scalar,
    pub null_count: u64,
}

impl ColumnStats {
    pub fn from_column(column: &ColumnBuffer) -> Self {
        let mut min = Scalar::Null;
        let mut max = Scalar::Null;
        let mut null_count = 0u64;
        for value in column.iter() {
            match &value {
                Scalar::Null => {
                    null_count += 1;
                    continue;
                }
                Scalar::Float64(f) if f.is_nan() => continue,
                _ => {}
            }
            if min.is_null() || value.total_cmp(&min) == Ordering::Less {
                min = value.clone();
            }
            if max.is_null() || value.total_cmp(&max) == Ordering::Greater {
                max = value;
            }
        }
        Self {
            min,
            max,
            null_count,
        }
    }

    /// False only when no value in `[min, max]` can satisfy
    /// `column <op> literal`. Unknown comparisons answer true.
    pub fn may_satisfy(&self, op: CompareOp, literal: &Scalar) -> bool {
        if literal.is_null() {
            return false;
        }
        if self.min.is_null() || self.max.is_null() {
            // Nulls and NaN only; NaN != x holds
            return op == CompareOp::NotEq;
        }
        let (Some(lo), Some(hi)) = (self.min.sql_cmp(literal), self.max.sql_cmp(literal)) else {
            return true;
        };
        match op {
            CompareOp::Eq => lo != Ordering::Greater && hi != Ordering::Less,
            CompareOp::NotEq => true,
            CompareOp::Lt => lo == Ordering::Less,
            CompareOp::LtEq => lo != Ordering::Greater,
            CompareOp::Gt => hi == Ordering::Greater,
            CompareOp::GtEq => hi != Ordering::Less,
        }
    }
}

/// Statistics of every column of one partition
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionStats {
    pub row_count: u64,
    columns: HashMap<String, ColumnStats>,
}

impl PartitionStats {
    /// Computes statistics in one pass over a fully read partition
    pub fn from_batch(batch: &Batch) -> Self {
        Self {
            row_count: batch.num_rows() as u64,
            columns: batch
                .columns()
                .iter()
                .map(|c| (c.name().to_string(), ColumnStats::from_column(c)))
                .collect(),
        }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnStats> {
        self.columns.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::ColumnData;

    fn stats(values: Vec<Option<i64>>) -> ColumnStats {
        ColumnStats::from_column(&ColumnBuffer::new("n", ColumnData::Int64(values)))
    }

    #[test]
    fn test_min_max_skip_nulls() {
        let s = stats(vec![Some(5), None, Some(-2), Some(9)]);
        assert_eq!(s.min, Scalar::Int64(-2));
        assert_eq!(s.max, Scalar::Int64(9));
        assert_eq!(s.null_count, 1);
    }

    #[test]
    fn test_may_satisfy_ranges() {
        let s = stats(vec![Some(10), Some(20)]);
        assert!(!s.may_satisfy(CompareOp::Eq, &Scalar::Int64(5)));
        assert!(s.may_satisfy(CompareOp::Eq, &Scalar::Int64(15)));
        assert!(!s.may_satisfy(CompareOp::Gt, &Scalar::Int64(20)));
        assert!(s.may_satisfy(CompareOp::GtEq, &Scalar::Int64(20)));
        assert!(!s.may_satisfy(CompareOp::Lt, &Scalar::Int64(10)));
        assert!(s.may_satisfy(CompareOp::NotEq, &Scalar::Int64(10)));
    }

    #[test]
    fn test_all_null_column_satisfies_nothing() {
        let s = stats(vec![None, None]);
        assert!(!s.may_satisfy(CompareOp::Eq, &Scalar::Int64(1)));
    }
}

//! In-memory sorting
//!
//! Sorts are stable: rows with equal keys keep their input order, which is
//! partition order for scan output. Ascending order puts nulls first;
//! descending order is its exact reverse.

use std::cmp::Ordering;

use crate::column::{Batch, Scalar};
use crate::planner::SortKey;

use super::errors::{ExecError, ExecResult};

/// Sort keys resolved to column positions
#[derive(Debug, Clone)]
pub struct ResolvedKeys {
    keys: Vec<(usize, bool)>,
}

impl ResolvedKeys {
    pub fn resolve(batch_columns: &[&str], keys: &[SortKey]) -> ExecResult<Self> {
        let keys = keys
            .iter()
            .map(|k| {
                batch_columns
                    .iter()
                    .position(|c| *c == k.column)
                    .map(|i| (i, k.descending))
                    .ok_or_else(|| ExecError::invalid_value(&k.column, "unknown sort column"))
            })
            .collect::<ExecResult<Vec<_>>>()?;
        Ok(Self { keys })
    }

    /// Compares two rows laid out like the resolved columns
    pub fn compare_rows(&self, a: &[Scalar], b: &[Scalar]) -> Ordering {
        for &(index, descending) in &self.keys {
            let ordering = match (a.get(index), b.get(index)) {
                (Some(x), Some(y)) => x.total_cmp(y),
                _ => Ordering::Equal,
            };
            let ordering = if descending { ordering.reverse() } else { ordering };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }

    /// Stable sort permutation of a batch
    fn permutation(&self, batch: &Batch) -> Vec<usize> {
        let key_values: Vec<Vec<Scalar>> = self
            .keys
            .iter()
            .map(|&(index, _)| batch.columns()[index].iter().collect())
            .collect();
        let mut order: Vec<usize> = (0..batch.num_rows()).collect();
        order.sort_by(|&a, &b| {
            for (values, &(_, descending)) in key_values.iter().zip(&self.keys) {
                let ordering = values[a].total_cmp(&values[b]);
                let ordering = if descending { ordering.reverse() } else { ordering };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        });
        order
    }
}

/// Sorts a whole batch, keeping the first `fetch` rows if given
pub fn sort_batch(batch: Batch, keys: &[SortKey], fetch: Option<usize>) -> ExecResult<Batch> {
    let names: Vec<&str> = batch.columns().iter().map(|c| c.name()).collect();
    let resolved = ResolvedKeys::resolve(&names, keys)?;
    let mut order = resolved.permutation(&batch);
    if let Some(n) = fetch {
        order.truncate(n);
    }
    Ok(batch.take(&order))
}

/// Bounded top-k over a stream of batches.
///
/// Holds at most `k` rows between pushes. Feeding batches in partition
/// order yields the same rows as a full stable sort followed by a limit.
#[derive(Debug)]
pub struct TopK {
    keys: Vec<SortKey>,
    k: usize,
    buffer: Option<Batch>,
}

impl TopK {
    pub fn new(keys: Vec<SortKey>, k: usize) -> Self {
        Self {
            keys,
            k,
            buffer: None,
        }
    }

    pub fn push(&mut self, batch: Batch) -> ExecResult<()> {
        if self.k == 0 || batch.is_empty() {
            return Ok(());
        }
        let combined = match self.buffer.take() {
            Some(mut held) => {
                held.append(batch)
                    .map_err(|reason| ExecError::invalid_value("top-k buffer", reason))?;
                held
            }
            None => batch,
        };
        self.buffer = Some(sort_batch(combined, &self.keys, Some(self.k))?);
        Ok(())
    }

    pub fn finish(self) -> Option<Batch> {
        self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::{ColumnBuffer, ColumnData};

    fn batch(keys: Vec<Option<i64>>, tags: Vec<&str>) -> Batch {
        Batch::try_new(vec![
            ColumnBuffer::new("k", ColumnData::Int64(keys)),
            ColumnBuffer::new(
                "tag",
                ColumnData::Utf8(tags.into_iter().map(|t| Some(t.to_string())).collect()),
            ),
        ])
        .unwrap()
    }

    fn tags(batch: &Batch) -> Vec<String> {
        batch
            .column("tag")
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap_or_default().to_string())
            .collect()
    }

    #[test]
    fn test_sort_is_stable_with_nulls_first() {
        let b = batch(vec![Some(2), None, Some(1), Some(2)], vec!["a", "b", "c", "d"]);
        let sorted = sort_batch(b, &[SortKey::asc("k")], None).unwrap();
        assert_eq!(tags(&sorted), vec!["b", "c", "a", "d"]);
    }

    #[test]
    fn test_descending_reverses_order() {
        let b = batch(vec![Some(2), None, Some(3)], vec!["a", "b", "c"]);
        let sorted = sort_batch(b, &[SortKey::desc("k")], Some(2)).unwrap();
        assert_eq!(tags(&sorted), vec!["c", "a"]);
    }

    #[test]
    fn test_top_k_matches_full_sort() {
        let parts = vec![
            batch(vec![Some(5), Some(1)], vec!["p0a", "p0b"]),
            batch(vec![Some(1), Some(9)], vec!["p1a", "p1b"]),
            batch(vec![Some(3)], vec!["p2a"]),
        ];
        let mut top = TopK::new(vec![SortKey::asc("k")], 3);
        let mut all: Option<Batch> = None;
        for p in parts {
            match all.as_mut() {
                Some(a) => a.append(p.clone()).unwrap(),
                None => all = Some(p.clone()),
            }
            top.push(p).unwrap();
        }
        let expected = sort_batch(all.unwrap(), &[SortKey::asc("k")], Some(3)).unwrap();
        assert_eq!(top.finish().unwrap(), expected);
    }

    #[test]
    fn test_unknown_sort_column() {
        let b = batch(vec![Some(1)], vec!["a"]);
        assert!(sort_batch(b, &[SortKey::asc("nope")], None).is_err());
    }
}

//! Batches of equally long columns
//!
//! A batch is the unit that flows between operators: one partition's
//! columns after scan, or a slice of a blocking operator's output.

use crate::schema::{Field, LogicalSchema};

use super::buffer::{ColumnBuffer, ColumnData};
use super::scalar::Scalar;

/// Equal-length columns moved as one unit
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    columns: Vec<ColumnBuffer>,
    num_rows: usize,
}

impl Batch {
    /// Creates a batch. Returns the offending column name if lengths differ.
    pub fn try_new(columns: Vec<ColumnBuffer>) -> Result<Self, String> {
        let num_rows = columns.first().map_or(0, |c| c.len());
        if let Some(bad) = columns.iter().find(|c| c.len() != num_rows) {
            return Err(bad.name().to_string());
        }
        Ok(Self { columns, num_rows })
    }

    /// A batch with explicit row count; used for column-less results
    /// such as `count(*)` inputs.
    pub fn with_row_count(columns: Vec<ColumnBuffer>, num_rows: usize) -> Result<Self, String> {
        if let Some(bad) = columns.iter().find(|c| c.len() != num_rows) {
            return Err(bad.name().to_string());
        }
        Ok(Self { columns, num_rows })
    }

    /// Zero-row batch matching a schema
    pub fn empty(schema: &LogicalSchema) -> Self {
        let columns = schema
            .fields()
            .iter()
            .map(|f| ColumnBuffer::new(f.name.clone(), ColumnData::with_capacity(f.logical_type, 0)))
            .collect();
        Self {
            columns,
            num_rows: 0,
        }
    }

    /// Builds a batch from rows of scalars laid out per `schema`.
    ///
    /// Returns the name of the first column that received a value of the
    /// wrong type.
    pub fn from_rows(schema: &LogicalSchema, rows: Vec<Vec<Scalar>>) -> Result<Self, String> {
        let mut data: Vec<ColumnData> = schema
            .fields()
            .iter()
            .map(|f| ColumnData::with_capacity(f.logical_type, rows.len()))
            .collect();
        let num_rows = rows.len();
        for row in rows {
            if row.len() != data.len() {
                return Err(format!("row of width {} for {} columns", row.len(), data.len()));
            }
            for (idx, value) in row.into_iter().enumerate() {
                data[idx]
                    .push(value)
                    .map_err(|_| schema.fields()[idx].name.clone())?;
            }
        }
        let columns = schema
            .fields()
            .iter()
            .zip(data)
            .map(|(f, d)| ColumnBuffer::new(f.name.clone(), d))
            .collect();
        Ok(Self { columns, num_rows })
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.num_rows == 0
    }

    pub fn columns(&self) -> &[ColumnBuffer] {
        &self.columns
    }

    pub fn into_columns(self) -> Vec<ColumnBuffer> {
        self.columns
    }

    pub fn column(&self, name: &str) -> Option<&ColumnBuffer> {
        self.columns.iter().find(|c| c.name() == name)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name() == name)
    }

    /// Schema implied by the column names and types
    pub fn schema(&self) -> LogicalSchema {
        LogicalSchema::from_fields_unchecked(
            self.columns
                .iter()
                .map(|c| Field::new(c.name(), c.logical_type()))
                .collect(),
        )
    }

    /// One row as scalars
    pub fn row(&self, row: usize) -> Vec<Scalar> {
        self.columns.iter().map(|c| c.value(row)).collect()
    }

    /// Keeps rows whose mask entry is true, consuming the batch
    pub fn filter(self, mask: &[bool]) -> Self {
        let num_rows = mask.iter().filter(|keep| **keep).count();
        let columns = self.columns.into_iter().map(|c| c.filter(mask)).collect();
        Self { columns, num_rows }
    }

    /// Gathers rows by index
    pub fn take(&self, indices: &[usize]) -> Self {
        Self {
            columns: self.columns.iter().map(|c| c.take(indices)).collect(),
            num_rows: indices.len(),
        }
    }

    /// First `len` rows, consuming the batch
    pub fn truncate(self, len: usize) -> Self {
        if len >= self.num_rows {
            return self;
        }
        let columns = self
            .columns
            .into_iter()
            .map(|c| {
                let name = c.name().to_string();
                let mut data = c.into_data();
                data.truncate(len);
                ColumnBuffer::new(name, data)
            })
            .collect();
        Self {
            columns,
            num_rows: len,
        }
    }

    /// Appends the rows of `other`, which must have the same layout
    pub fn append(&mut self, other: Batch) -> Result<(), String> {
        if other.columns.len() != self.columns.len() {
            return Err(format!(
                "cannot append {} columns to {}",
                other.columns.len(),
                self.columns.len()
            ));
        }
        let added = other.num_rows;
        let mut appended = Vec::with_capacity(self.columns.len());
        for (mine, theirs) in std::mem::take(&mut self.columns).into_iter().zip(other.columns) {
            let name = mine.name().to_string();
            let mut data = mine.into_data();
            data.append(theirs.into_data())
                .map_err(|_| format!("type mismatch appending column '{}'", name))?;
            appended.push(ColumnBuffer::new(name, data));
        }
        self.columns = appended;
        self.num_rows += added;
        Ok(())
    }

    /// Concatenates batches with identical layout
    pub fn concat(schema: &LogicalSchema, batches: Vec<Batch>) -> Result<Self, String> {
        let mut result = Batch::empty(schema);
        for batch in batches {
            result.append(batch)?;
        }
        Ok(result)
    }

    /// Approximate resident size in bytes
    pub fn byte_size(&self) -> usize {
        self.columns.iter().map(|c| c.byte_size()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::LogicalType;

    fn schema() -> LogicalSchema {
        LogicalSchema::from_fields_unchecked(vec![
            Field::new("k", LogicalType::Utf8),
            Field::new("v", LogicalType::Int64),
        ])
    }

    fn sample() -> Batch {
        Batch::from_rows(
            &schema(),
            vec![
                vec![Scalar::from("a"), Scalar::Int64(1)],
                vec![Scalar::from("b"), Scalar::Null],
                vec![Scalar::from("c"), Scalar::Int64(3)],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_try_new_rejects_ragged_columns() {
        let result = Batch::try_new(vec![
            ColumnBuffer::new("a", ColumnData::Int64(vec![Some(1)])),
            ColumnBuffer::new("b", ColumnData::Int64(vec![])),
        ]);
        assert_eq!(result.unwrap_err(), "b");
    }

    #[test]
    fn test_from_rows_reports_mistyped_column() {
        let err = Batch::from_rows(&schema(), vec![vec![Scalar::from("a"), Scalar::from("x")]])
            .unwrap_err();
        assert_eq!(err, "v");
    }

    #[test]
    fn test_filter_and_row_access() {
        let filtered = sample().filter(&[true, false, true]);
        assert_eq!(filtered.num_rows(), 2);
        assert_eq!(filtered.row(1), vec![Scalar::from("c"), Scalar::Int64(3)]);
    }

    #[test]
    fn test_truncate() {
        let truncated = sample().truncate(1);
        assert_eq!(truncated.num_rows(), 1);
        assert_eq!(truncated.column("k").unwrap().len(), 1);
    }

    #[test]
    fn test_concat() {
        let combined = Batch::concat(&schema(), vec![sample(), sample()]).unwrap();
        assert_eq!(combined.num_rows(), 6);
        assert_eq!(combined.schema(), schema());
    }
}

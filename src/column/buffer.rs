//! Typed column buffers
//!
//! A `ColumnBuffer` holds one column's values for one partition (or a
//! subset of its rows). Buffers are read-only once built and are moved,
//! never shared, between pipeline stages: every transformation consumes its
//! input and returns a new buffer.

use crate::schema::LogicalType;

use super::scalar::Scalar;

/// Values of one column, one variant per logical type
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Int32(Vec<Option<i32>>),
    Int64(Vec<Option<i64>>),
    Float64(Vec<Option<f64>>),
    Utf8(Vec<Option<String>>),
    Bool(Vec<Option<bool>>),
    Date(Vec<Option<i32>>),
    Timestamp(Vec<Option<i64>>),
}

macro_rules! for_each_variant {
    ($data:expr, $values:ident => $body:expr) => {
        match $data {
            ColumnData::Int32($values) => $body,
            ColumnData::Int64($values) => $body,
            ColumnData::Float64($values) => $body,
            ColumnData::Utf8($values) => $body,
            ColumnData::Bool($values) => $body,
            ColumnData::Date($values) => $body,
            ColumnData::Timestamp($values) => $body,
        }
    };
}

macro_rules! map_variant {
    ($data:expr, $values:ident => $body:expr) => {
        match $data {
            ColumnData::Int32($values) => ColumnData::Int32($body),
            ColumnData::Int64($values) => ColumnData::Int64($body),
            ColumnData::Float64($values) => ColumnData::Float64($body),
            ColumnData::Utf8($values) => ColumnData::Utf8($body),
            ColumnData::Bool($values) => ColumnData::Bool($body),
            ColumnData::Date($values) => ColumnData::Date($body),
            ColumnData::Timestamp($values) => ColumnData::Timestamp($body),
        }
    };
}

impl ColumnData {
    /// Empty data of a type with room for `capacity` values
    pub fn with_capacity(logical_type: LogicalType, capacity: usize) -> Self {
        match logical_type {
            LogicalType::Int32 => ColumnData::Int32(Vec::with_capacity(capacity)),
            LogicalType::Int64 => ColumnData::Int64(Vec::with_capacity(capacity)),
            LogicalType::Float64 => ColumnData::Float64(Vec::with_capacity(capacity)),
            LogicalType::Utf8 => ColumnData::Utf8(Vec::with_capacity(capacity)),
            LogicalType::Bool => ColumnData::Bool(Vec::with_capacity(capacity)),
            LogicalType::Date => ColumnData::Date(Vec::with_capacity(capacity)),
            LogicalType::Timestamp => ColumnData::Timestamp(Vec::with_capacity(capacity)),
        }
    }

    pub fn logical_type(&self) -> LogicalType {
        match self {
            ColumnData::Int32(_) => LogicalType::Int32,
            ColumnData::Int64(_) => LogicalType::Int64,
            ColumnData::Float64(_) => LogicalType::Float64,
            ColumnData::Utf8(_) => LogicalType::Utf8,
            ColumnData::Bool(_) => LogicalType::Bool,
            ColumnData::Date(_) => LogicalType::Date,
            ColumnData::Timestamp(_) => LogicalType::Timestamp,
        }
    }

    pub fn len(&self) -> usize {
        for_each_variant!(self, values => values.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Value at `row` as a scalar. Panics if `row` is out of bounds.
    pub fn value(&self, row: usize) -> Scalar {
        match self {
            ColumnData::Int32(v) => v[row].map(Scalar::Int32).unwrap_or(Scalar::Null),
            ColumnData::Int64(v) => v[row].map(Scalar::Int64).unwrap_or(Scalar::Null),
            ColumnData::Float64(v) => v[row].map(Scalar::Float64).unwrap_or(Scalar::Null),
            ColumnData::Utf8(v) => v[row]
                .as_ref()
                .map(|s| Scalar::Utf8(s.clone()))
                .unwrap_or(Scalar::Null),
            ColumnData::Bool(v) => v[row].map(Scalar::Bool).unwrap_or(Scalar::Null),
            ColumnData::Date(v) => v[row].map(Scalar::Date).unwrap_or(Scalar::Null),
            ColumnData::Timestamp(v) => v[row].map(Scalar::Timestamp).unwrap_or(Scalar::Null),
        }
    }

    pub fn is_null(&self, row: usize) -> bool {
        for_each_variant!(self, values => values[row].is_none())
    }

    pub fn null_count(&self) -> usize {
        for_each_variant!(self, values => values.iter().filter(|v| v.is_none()).count())
    }

    /// Appends a scalar. Returns the scalar back if its type does not match.
    ///
    /// Int32 scalars are accepted by Int64 columns and integers by Float64
    /// columns; both are lossless.
    pub fn push(&mut self, value: Scalar) -> Result<(), Scalar> {
        match (self, value) {
            (ColumnData::Int32(v), Scalar::Null) => v.push(None),
            (ColumnData::Int64(v), Scalar::Null) => v.push(None),
            (ColumnData::Float64(v), Scalar::Null) => v.push(None),
            (ColumnData::Utf8(v), Scalar::Null) => v.push(None),
            (ColumnData::Bool(v), Scalar::Null) => v.push(None),
            (ColumnData::Date(v), Scalar::Null) => v.push(None),
            (ColumnData::Timestamp(v), Scalar::Null) => v.push(None),
            (ColumnData::Int32(v), Scalar::Int32(x)) => v.push(Some(x)),
            (ColumnData::Int64(v), Scalar::Int64(x)) => v.push(Some(x)),
            (ColumnData::Int64(v), Scalar::Int32(x)) => v.push(Some(x as i64)),
            (ColumnData::Float64(v), Scalar::Float64(x)) => v.push(Some(x)),
            (ColumnData::Float64(v), Scalar::Int32(x)) => v.push(Some(x as f64)),
            (ColumnData::Utf8(v), Scalar::Utf8(x)) => v.push(Some(x)),
            (ColumnData::Bool(v), Scalar::Bool(x)) => v.push(Some(x)),
            (ColumnData::Date(v), Scalar::Date(x)) => v.push(Some(x)),
            (ColumnData::Timestamp(v), Scalar::Timestamp(x)) => v.push(Some(x)),
            (_, other) => return Err(other),
        }
        Ok(())
    }

    /// Keeps rows whose mask entry is true
    pub fn filter(self, mask: &[bool]) -> Self {
        map_variant!(self, values => values
            .into_iter()
            .zip(mask.iter())
            .filter_map(|(v, keep)| if *keep { Some(v) } else { None })
            .collect())
    }

    /// Gathers rows by index
    pub fn take(&self, indices: &[usize]) -> Self {
        map_variant!(self, values => indices.iter().map(|&i| values[i].clone()).collect())
    }

    /// Appends all values of `other`, which must have the same type
    pub fn append(&mut self, other: ColumnData) -> Result<(), ColumnData> {
        match (self, other) {
            (ColumnData::Int32(a), ColumnData::Int32(b)) => a.extend(b),
            (ColumnData::Int64(a), ColumnData::Int64(b)) => a.extend(b),
            (ColumnData::Float64(a), ColumnData::Float64(b)) => a.extend(b),
            (ColumnData::Utf8(a), ColumnData::Utf8(b)) => a.extend(b),
            (ColumnData::Bool(a), ColumnData::Bool(b)) => a.extend(b),
            (ColumnData::Date(a), ColumnData::Date(b)) => a.extend(b),
            (ColumnData::Timestamp(a), ColumnData::Timestamp(b)) => a.extend(b),
            (_, other) => return Err(other),
        }
        Ok(())
    }

    /// Drops everything after the first `len` values
    pub fn truncate(&mut self, len: usize) {
        for_each_variant!(self, values => values.truncate(len))
    }

    /// Approximate resident size in bytes
    pub fn byte_size(&self) -> usize {
        match self {
            ColumnData::Utf8(values) => values
                .iter()
                .map(|v| std::mem::size_of::<Option<String>>() + v.as_ref().map_or(0, |s| s.len()))
                .sum(),
            other => for_each_variant!(other, values => std::mem::size_of_val(values.as_slice())),
        }
    }
}

/// One named column of a batch
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnBuffer {
    name: String,
    data: ColumnData,
}

impl ColumnBuffer {
    pub fn new(name: impl Into<String>, data: ColumnData) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    /// Builds a column from scalars, failing on the first mistyped value
    pub fn from_scalars(
        name: impl Into<String>,
        logical_type: LogicalType,
        values: impl IntoIterator<Item = Scalar>,
    ) -> Result<Self, Scalar> {
        let values = values.into_iter();
        let mut data = ColumnData::with_capacity(logical_type, values.size_hint().0);
        for value in values {
            data.push(value)?;
        }
        Ok(Self::new(name, data))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn logical_type(&self) -> LogicalType {
        self.data.logical_type()
    }

    pub fn data(&self) -> &ColumnData {
        &self.data
    }

    pub fn into_data(self) -> ColumnData {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn value(&self, row: usize) -> Scalar {
        self.data.value(row)
    }

    pub fn null_count(&self) -> usize {
        self.data.null_count()
    }

    /// Same values under a new name
    pub fn renamed(self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: self.data,
        }
    }

    pub fn filter(self, mask: &[bool]) -> Self {
        Self {
            name: self.name,
            data: self.data.filter(mask),
        }
    }

    pub fn take(&self, indices: &[usize]) -> Self {
        Self {
            name: self.name.clone(),
            data: self.data.take(indices),
        }
    }

    pub fn byte_size(&self) -> usize {
        self.data.byte_size()
    }

    pub fn iter(&self) -> impl Iterator<Item = Scalar> + '_ {
        (0..self.len()).map(move |row| self.value(row))
    }
}

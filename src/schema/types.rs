//! Logical schema types
//!
//! Supported logical types:
//! - int32: 32-bit signed integer
//! - int64: 64-bit signed integer
//! - float64: 64-bit floating point
//! - utf8: UTF-8 string
//! - bool: Boolean
//! - date: calendar date (days since 1970-01-01)
//! - timestamp: microseconds since 1970-01-01T00:00:00 UTC
//!
//! The set is closed. Code downstream of binding matches exhaustively on it.

use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::errors::{SchemaError, SchemaResult};

/// Logical column type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogicalType {
    Int32,
    Int64,
    Float64,
    Utf8,
    Bool,
    Date,
    Timestamp,
}

impl LogicalType {
    /// Returns the type name used in schema specifications and errors
    pub fn type_name(&self) -> &'static str {
        match self {
            LogicalType::Int32 => "int32",
            LogicalType::Int64 => "int64",
            LogicalType::Float64 => "float64",
            LogicalType::Utf8 => "utf8",
            LogicalType::Bool => "bool",
            LogicalType::Date => "date",
            LogicalType::Timestamp => "timestamp",
        }
    }

    /// Parses a type name, case-insensitively. Accepts a few common aliases.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "int32" | "int" | "integer" => Some(LogicalType::Int32),
            "int64" | "bigint" | "long" => Some(LogicalType::Int64),
            "float64" | "double" | "float" => Some(LogicalType::Float64),
            "utf8" | "string" | "text" => Some(LogicalType::Utf8),
            "bool" | "boolean" => Some(LogicalType::Bool),
            "date" => Some(LogicalType::Date),
            "timestamp" => Some(LogicalType::Timestamp),
            _ => None,
        }
    }

    /// Returns true for types that take part in arithmetic
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            LogicalType::Int32 | LogicalType::Int64 | LogicalType::Float64
        )
    }
}

impl fmt::Display for LogicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_name())
    }
}

/// A named, typed column of a logical schema
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type")]
    pub logical_type: LogicalType,
}

impl Field {
    pub fn new(name: impl Into<String>, logical_type: LogicalType) -> Self {
        Self {
            name: name.into(),
            logical_type,
        }
    }
}

/// Ordered sequence of uniquely named fields.
///
/// Cheap to clone; the field list is shared. Only `SchemaRegistry::bind`
/// and plan-derived projections construct schemas, so name uniqueness
/// holds for every instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalSchema {
    fields: Arc<[Field]>,
}

impl LogicalSchema {
    /// Builds a schema from fields already known to be unique.
    pub(crate) fn from_fields_unchecked(fields: Vec<Field>) -> Self {
        Self {
            fields: fields.into(),
        }
    }

    /// Returns all fields in declaration order
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Number of columns
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if the schema has no columns
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Position of a column by name
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Field by name
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Column names in order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Sub-schema with the given columns in the given order.
    ///
    /// Returns the first name that is not part of this schema as the error.
    pub fn project<S: AsRef<str>>(&self, names: &[S]) -> Result<Self, String> {
        let mut fields = Vec::with_capacity(names.len());
        for name in names {
            let name = name.as_ref();
            match self.field(name) {
                Some(field) => {
                    if !fields.iter().any(|f: &Field| f.name == name) {
                        fields.push(field.clone());
                    }
                }
                None => return Err(name.to_string()),
            }
        }
        Ok(Self::from_fields_unchecked(fields))
    }
}

impl fmt::Display for LogicalSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", field.name, field.logical_type)?;
        }
        write!(f, ")")
    }
}

/// One column of a raw, unvalidated schema specification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
}

/// Unvalidated schema specification as supplied by a caller.
///
/// Serialized as a JSON array of `{"name": ..., "type": ...}` objects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawSchemaSpec {
    pub columns: Vec<RawColumn>,
}

impl RawSchemaSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a column
    pub fn column(mut self, name: impl Into<String>, type_name: impl Into<String>) -> Self {
        self.columns.push(RawColumn {
            name: name.into(),
            type_name: type_name.into(),
        });
        self
    }

    /// Parses a specification from JSON text
    pub fn from_json(text: &str) -> SchemaResult<Self> {
        serde_json::from_str(text).map_err(|e| SchemaError::Malformed {
            source_name: "<inline>".into(),
            reason: e.to_string(),
        })
    }

    /// Loads a specification from a JSON file
    pub fn load(path: &Path) -> SchemaResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| SchemaError::Malformed {
            source_name: path.display().to_string(),
            reason: format!("failed to read file: {}", e),
        })?;
        serde_json::from_str(&content).map_err(|e| SchemaError::Malformed {
            source_name: path.display().to_string(),
            reason: format!("invalid JSON: {}", e),
        })
    }
}

impl From<&LogicalSchema> for RawSchemaSpec {
    fn from(schema: &LogicalSchema) -> Self {
        Self {
            columns: schema
                .fields()
                .iter()
                .map(|f| RawColumn {
                    name: f.name.clone(),
                    type_name: f.logical_type.type_name().to_string(),
                })
                .collect(),
        }
    }
}

//! Schema registry
//!
//! Binds raw schema specifications to validated `LogicalSchema`s and keeps
//! named schemas loaded from a directory of JSON specification files.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::column::ColumnBuffer;
use crate::storage::PhysicalColumn;

use super::coerce::{coerce_column, CoercionMode};
use super::errors::{SchemaError, SchemaResult};
use super::types::{Field, LogicalSchema, LogicalType, RawSchemaSpec};

/// Registry of bound schemas.
///
/// Binding itself is stateless; the registry only remembers schemas that
/// were registered under a name.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<String, LogicalSchema>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates a raw specification into a logical schema.
    ///
    /// Checks that at least one column exists, names are non-empty and
    /// unique, and every type name is recognized.
    pub fn bind(raw: &RawSchemaSpec) -> SchemaResult<LogicalSchema> {
        if raw.columns.is_empty() {
            return Err(SchemaError::Empty);
        }
        let mut fields: Vec<Field> = Vec::with_capacity(raw.columns.len());
        for column in &raw.columns {
            if column.name.is_empty() {
                return Err(SchemaError::Malformed {
                    source_name: "<spec>".into(),
                    reason: "column name must not be empty".into(),
                });
            }
            if fields.iter().any(|f| f.name == column.name) {
                return Err(SchemaError::DuplicateColumn(column.name.clone()));
            }
            let logical_type =
                LogicalType::parse(&column.type_name).ok_or_else(|| SchemaError::UnknownType {
                    column: column.name.clone(),
                    type_name: column.type_name.clone(),
                })?;
            fields.push(Field::new(column.name.clone(), logical_type));
        }
        Ok(LogicalSchema::from_fields_unchecked(fields))
    }

    /// Coerces one decoded chunk to the logical type of its column
    pub fn coerce(
        name: &str,
        physical: PhysicalColumn,
        target: LogicalType,
        mode: CoercionMode,
    ) -> SchemaResult<ColumnBuffer> {
        let data = coerce_column(name, physical, target, mode)?;
        Ok(ColumnBuffer::new(name, data))
    }

    /// Binds and stores a schema under a name, replacing any previous one
    pub fn register(&mut self, name: impl Into<String>, raw: &RawSchemaSpec) -> SchemaResult<LogicalSchema> {
        let schema = Self::bind(raw)?;
        self.schemas.insert(name.into(), schema.clone());
        Ok(schema)
    }

    pub fn get(&self, name: &str) -> Option<&LogicalSchema> {
        self.schemas.get(name)
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    /// Loads every `<name>.json` specification in `dir`.
    ///
    /// A single malformed file fails the whole load. Returns the number of
    /// schemas loaded.
    pub fn load_dir(&mut self, dir: &Path) -> SchemaResult<usize> {
        let malformed = |reason: String| SchemaError::Malformed {
            source_name: dir.display().to_string(),
            reason,
        };
        let entries =
            fs::read_dir(dir).map_err(|e| malformed(format!("failed to read directory: {}", e)))?;

        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| malformed(format!("failed to read entry: {}", e)))?;
            let path = entry.path();
            if path.extension().map_or(false, |ext| ext == "json") {
                paths.push(path);
            }
        }
        paths.sort();

        for path in &paths {
            let name = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let raw = RawSchemaSpec::load(path)?;
            self.register(name, &raw)?;
        }
        Ok(paths.len())
    }
}

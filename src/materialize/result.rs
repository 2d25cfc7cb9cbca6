//! Materialized query results
//!
//! A `ResultHandle` is what a terminal call returns. Unlike a `QueryPlan`
//! it holds data, either in memory or in a result directory on disk.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::catalog::{DatasetHandle, PartitionCatalog};
use crate::column::{Batch, ColumnBuffer, Scalar};
use crate::executor::ExecStats;
use crate::schema::{LogicalSchema, SchemaRegistry};

use super::errors::{MaterializeError, MaterializeResult};
use super::manifest::{DurableManifest, MANIFEST_FILE};

/// Bounded result held in memory
#[derive(Debug, Clone, PartialEq)]
pub struct InMemoryTable {
    schema: LogicalSchema,
    batch: Batch,
    truncated: bool,
    stats: ExecStats,
}

impl InMemoryTable {
    pub(crate) fn new(schema: LogicalSchema, batch: Batch, truncated: bool, stats: ExecStats) -> Self {
        Self {
            schema,
            batch,
            truncated,
            stats,
        }
    }

    pub fn schema(&self) -> &LogicalSchema {
        &self.schema
    }

    pub fn batch(&self) -> &Batch {
        &self.batch
    }

    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    /// True if the query produced more rows than were kept
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    pub fn stats(&self) -> &ExecStats {
        &self.stats
    }

    /// Values of row `index` in schema order
    pub fn row(&self, index: usize) -> Option<Vec<Scalar>> {
        (index < self.batch.num_rows()).then(|| self.batch.row(index))
    }

    pub fn column(&self, name: &str) -> Option<&ColumnBuffer> {
        self.batch.column(name)
    }

    pub fn rows(&self) -> impl Iterator<Item = Vec<Scalar>> + '_ {
        (0..self.batch.num_rows()).map(|i| self.batch.row(i))
    }

    pub fn describe(&self) -> ResultDescription {
        ResultDescription {
            kind: ResultKind::Memory,
            schema: self.schema.clone(),
            row_count: self.num_rows() as u64,
            partition_count: None,
            truncated: self.truncated,
        }
    }
}

/// Result spilled to a directory of partition files
#[derive(Debug, Clone, PartialEq)]
pub struct DurableIntermediate {
    id: Uuid,
    path: PathBuf,
    schema: LogicalSchema,
    partitions: Vec<String>,
    row_count: u64,
    created_at: DateTime<Utc>,
    stats: ExecStats,
}

impl DurableIntermediate {
    pub(crate) fn from_manifest(
        path: PathBuf,
        schema: LogicalSchema,
        manifest: &DurableManifest,
        stats: ExecStats,
    ) -> Self {
        Self {
            id: manifest.id,
            path,
            schema,
            partitions: manifest.partitions.clone(),
            row_count: manifest.row_count,
            created_at: manifest.created_at,
            stats,
        }
    }

    /// Loads a previously written result directory from its manifest
    pub fn load(dir: &Path) -> MaterializeResult<Self> {
        let manifest = DurableManifest::read_from_dir(dir)?;
        let schema = SchemaRegistry::bind(&manifest.schema).map_err(|e| {
            MaterializeError::manifest(dir.join(MANIFEST_FILE), e.to_string())
        })?;
        Ok(Self::from_manifest(
            dir.to_path_buf(),
            schema,
            &manifest,
            ExecStats::default(),
        ))
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn schema(&self) -> &LogicalSchema {
        &self.schema
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    /// Partition file names in result order, as recorded in the manifest
    pub fn partition_files(&self) -> &[String] {
        &self.partitions
    }

    pub fn row_count(&self) -> u64 {
        self.row_count
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Execution counters of the run that wrote this result; zero when
    /// loaded from disk
    pub fn stats(&self) -> &ExecStats {
        &self.stats
    }

    /// Reopens the result as a dataset using a fresh catalog
    pub fn open(&self) -> MaterializeResult<DatasetHandle> {
        self.open_with(&PartitionCatalog::default())
    }

    /// Reopens the result as a dataset through `catalog`.
    ///
    /// Only the partitions named in the manifest are opened. Their header
    /// row counts must add up to the recorded row count.
    pub fn open_with(&self, catalog: &PartitionCatalog) -> MaterializeResult<DatasetHandle> {
        let manifest_path = self.path.join(MANIFEST_FILE);
        let mut files = Vec::with_capacity(self.partitions.len());
        for name in &self.partitions {
            let mut components = Path::new(name).components();
            match (components.next(), components.next()) {
                (Some(Component::Normal(_)), None) => files.push(self.path.join(name)),
                _ => {
                    return Err(MaterializeError::manifest(
                        manifest_path,
                        format!("partition entry {:?} is not a plain file name", name),
                    ))
                }
            }
        }

        let dataset = catalog.open_files(&self.path, &files, self.schema.clone())?;
        if dataset.total_rows() != self.row_count {
            return Err(MaterializeError::manifest(
                manifest_path,
                format!(
                    "partitions hold {} rows, manifest records {}",
                    dataset.total_rows(),
                    self.row_count
                ),
            ));
        }
        Ok(dataset)
    }

    pub fn describe(&self) -> ResultDescription {
        ResultDescription {
            kind: ResultKind::Durable,
            schema: self.schema.clone(),
            row_count: self.row_count,
            partition_count: Some(self.partition_count()),
            truncated: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultKind {
    Memory,
    Durable,
}

/// Summary of a materialized result. Building one performs no I/O.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultDescription {
    pub kind: ResultKind,
    pub schema: LogicalSchema,
    pub row_count: u64,
    pub partition_count: Option<usize>,
    pub truncated: bool,
}

impl fmt::Display for ResultDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ResultKind::Memory => write!(f, "memory {} rows={}", self.schema, self.row_count)?,
            ResultKind::Durable => write!(
                f,
                "durable {} rows={} partitions={}",
                self.schema,
                self.row_count,
                self.partition_count.unwrap_or(0)
            )?,
        }
        if self.truncated {
            write!(f, " truncated")?;
        }
        Ok(())
    }
}

/// Output of a terminal call
#[derive(Debug, Clone, PartialEq)]
pub enum ResultHandle {
    Memory(InMemoryTable),
    Durable(DurableIntermediate),
}

impl ResultHandle {
    pub fn schema(&self) -> &LogicalSchema {
        match self {
            ResultHandle::Memory(table) => table.schema(),
            ResultHandle::Durable(durable) => durable.schema(),
        }
    }

    pub fn describe(&self) -> ResultDescription {
        match self {
            ResultHandle::Memory(table) => table.describe(),
            ResultHandle::Durable(durable) => durable.describe(),
        }
    }
}

impl From<InMemoryTable> for ResultHandle {
    fn from(table: InMemoryTable) -> Self {
        ResultHandle::Memory(table)
    }
}

impl From<DurableIntermediate> for ResultHandle {
    fn from(durable: DurableIntermediate) -> Self {
        ResultHandle::Durable(durable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::ColumnData;
    use crate::schema::RawSchemaSpec;

    fn table(truncated: bool) -> InMemoryTable {
        let schema = SchemaRegistry::bind(&RawSchemaSpec::new().column("v", "int64")).unwrap();
        let batch = Batch::try_new(vec![ColumnBuffer::new(
            "v",
            ColumnData::Int64(vec![Some(1), None]),
        )])
        .unwrap();
        InMemoryTable::new(schema, batch, truncated, ExecStats::default())
    }

    #[test]
    fn test_row_access() {
        let t = table(false);
        assert_eq!(t.row(0), Some(vec![Scalar::Int64(1)]));
        assert_eq!(t.row(1), Some(vec![Scalar::Null]));
        assert_eq!(t.row(2), None);
        assert_eq!(t.column("v").unwrap().iter().count(), 2);
        assert!(t.column("w").is_none());
    }

    #[test]
    fn test_describe() {
        let handle = ResultHandle::from(table(true));
        let description = handle.describe();
        assert_eq!(description.row_count, 2);
        assert!(description.truncated);
        assert_eq!(description.to_string(), "memory (v: int64) rows=2 truncated");
    }
}

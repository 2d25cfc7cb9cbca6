//! The only way a plan turns into data
//!
//! Every terminal call names where its rows go: a bounded in-memory table
//! or a durable result directory. There is no unbounded "collect".

use std::fs;
use std::path::{Path, PathBuf};

use crate::executor::{ExecError, ExecutionEngine};
use crate::observability::{log_event, Event};
use crate::planner::QueryPlan;
use crate::schema::RawSchemaSpec;
use crate::storage::PARTITION_EXTENSION;

use super::errors::{MaterializeError, MaterializeResult};
use super::manifest::{DurableManifest, MANIFEST_FILE};
use super::result::{DurableIntermediate, InMemoryTable};
use super::sinks::{DurableSink, MemorySink};

#[derive(Debug, Clone)]
pub struct MaterializationGate {
    engine: ExecutionEngine,
}

impl MaterializationGate {
    pub fn new(engine: ExecutionEngine) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &ExecutionEngine {
        &self.engine
    }

    /// Runs `plan` keeping at most `max_rows` rows.
    ///
    /// When more rows exist the table holds exactly `max_rows` of them,
    /// is flagged truncated, and execution stops early.
    pub fn to_memory(&self, plan: &QueryPlan, max_rows: usize) -> MaterializeResult<InMemoryTable> {
        if max_rows == 0 {
            return Err(MaterializeError::InvalidLimit { max_rows });
        }
        let mut sink = MemorySink::new(max_rows);
        let stats = self.engine.execute(plan, &mut sink)?;
        let (batch, truncated) = sink
            .into_parts(plan.schema())
            .map_err(|e| MaterializeError::from(ExecError::from(e)))?;
        if truncated {
            log_event(
                Event::ResultTruncated,
                &[
                    ("max_rows", max_rows.to_string().as_str()),
                    ("rows_scanned", stats.rows_scanned.to_string().as_str()),
                ],
            );
        }
        Ok(InMemoryTable::new(plan.schema().clone(), batch, truncated, stats))
    }

    /// Runs `plan` writing one partition file per output batch into `dir`,
    /// followed by `_manifest.json`.
    ///
    /// `dir` is created if missing and must not already hold a result or
    /// any partition file.
    pub fn to_durable(&self, plan: &QueryPlan, dir: &Path) -> MaterializeResult<DurableIntermediate> {
        fs::create_dir_all(dir).map_err(|e| MaterializeError::io(dir, e))?;
        if dir.join(MANIFEST_FILE).exists() {
            return Err(MaterializeError::Io {
                path: dir.to_path_buf(),
                reason: "directory already holds a durable result".to_string(),
            });
        }
        if let Some(existing) = find_partition_file(dir)? {
            return Err(MaterializeError::Io {
                path: dir.to_path_buf(),
                reason: format!("directory already holds partition file {}", existing.display()),
            });
        }

        let mut sink = DurableSink::new(dir);
        let stats = self.engine.execute(plan, &mut sink)?;

        let partitions = sink
            .partitions()
            .iter()
            .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect();
        let manifest = DurableManifest::new(
            RawSchemaSpec::from(plan.schema()),
            partitions,
            sink.row_count(),
        );
        manifest.write_to_dir(dir)?;

        log_event(
            Event::DurableWritten,
            &[
                ("path", dir.display().to_string().as_str()),
                ("id", manifest.id.to_string().as_str()),
                ("partitions", manifest.partition_count().to_string().as_str()),
                ("rows", manifest.row_count.to_string().as_str()),
                ("bytes", sink.bytes_written().to_string().as_str()),
            ],
        );
        Ok(DurableIntermediate::from_manifest(
            dir.to_path_buf(),
            plan.schema().clone(),
            &manifest,
            stats,
        ))
    }
}

/// First `.scol` file directly under `dir`, if any
fn find_partition_file(dir: &Path) -> MaterializeResult<Option<PathBuf>> {
    for entry in fs::read_dir(dir).map_err(|e| MaterializeError::io(dir, e))? {
        let path = entry.map_err(|e| MaterializeError::io(dir, e))?.path();
        let is_partition = path
            .extension()
            .and_then(|e| e.to_str())
            .map_or(false, |e| e.eq_ignore_ascii_case(PARTITION_EXTENSION));
        if is_partition && path.is_file() {
            return Ok(Some(path));
        }
    }
    Ok(None)
}

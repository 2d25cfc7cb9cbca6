//! Shared fixtures for integration tests
//!
//! Datasets are written with the crate's own partition writer into
//! temporary directories. The standard "sales" layout is:
//!
//! | column | type    |
//! |--------|---------|
//! | region | utf8    |
//! | amount | int64   |
//! | price  | float64 |

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use strata::column::{Batch, ColumnBuffer, ColumnData};
use strata::executor::{BatchSink, SinkError, SinkState};
use strata::storage::PartitionWriter;
use strata::{EngineConfig, MaterializeConfig, RawSchemaSpec, Session, StrataConfig};
use tempfile::TempDir;

pub const REGIONS: [&str; 4] = ["east", "north", "south", "west"];

pub fn create_temp_dir() -> TempDir {
    TempDir::new().expect("Failed to create temp dir")
}

pub fn sales_spec() -> RawSchemaSpec {
    RawSchemaSpec::new()
        .column("region", "utf8")
        .column("amount", "int64")
        .column("price", "float64")
}

pub fn partition_path(dir: &Path, index: usize) -> PathBuf {
    dir.join(format!("part-{:05}.scol", index))
}

/// Writes one sales partition from `(region, amount, price)` rows
pub fn write_sales_partition(dir: &Path, index: usize, rows: &[(&str, Option<i64>, f64)]) -> PathBuf {
    let batch = Batch::try_new(vec![
        ColumnBuffer::new(
            "region",
            ColumnData::Utf8(rows.iter().map(|r| Some(r.0.to_string())).collect()),
        ),
        ColumnBuffer::new("amount", ColumnData::Int64(rows.iter().map(|r| r.1).collect())),
        ColumnBuffer::new(
            "price",
            ColumnData::Float64(rows.iter().map(|r| Some(r.2)).collect()),
        ),
    ])
    .expect("valid batch");
    let path = partition_path(dir, index);
    PartitionWriter::new()
        .write(&path, &batch)
        .expect("Failed to write partition");
    path
}

/// Writes `partitions` sales partitions of `rows_per_partition` seeded
/// random rows. Every partition has the same byte size.
pub fn write_random_sales(dir: &Path, partitions: usize, rows_per_partition: usize, seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    for p in 0..partitions {
        let rows: Vec<(&str, Option<i64>, f64)> = (0..rows_per_partition)
            .map(|_| {
                let region = REGIONS[rng.gen_range(0..REGIONS.len())];
                let amount = rng.gen_range(-1_000..10_000);
                let price = rng.gen_range(0.0..1_000.0);
                (region, Some(amount), price)
            })
            .collect();
        write_sales_partition(dir, p, &rows);
    }
}

pub fn config_with(engine: EngineConfig) -> StrataConfig {
    StrataConfig::new(engine, MaterializeConfig::new(1_000_000))
}

pub fn session_with(engine: EngineConfig) -> Session {
    Session::new(config_with(engine)).expect("valid config")
}

pub fn session(workers: usize) -> Session {
    session_with(EngineConfig::default().with_workers(workers))
}

/// Sink that counts rows and drops every batch
#[derive(Debug, Default)]
pub struct CountingSink {
    pub rows: usize,
    pub batches: usize,
}

impl BatchSink for CountingSink {
    fn push(&mut self, batch: Batch) -> Result<SinkState, SinkError> {
        self.rows += batch.num_rows();
        self.batches += 1;
        Ok(SinkState::NeedMore)
    }
}

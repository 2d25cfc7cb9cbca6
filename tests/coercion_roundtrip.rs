//! Coercion Round-Trip Tests
//!
//! Values written with a narrow physical type and read through a wider
//! logical type must come back unchanged. Narrowing is rejected.

mod common;

use common::{create_temp_dir, session};
use strata::column::Scalar;
use strata::storage::{PartitionWriter, PhysicalColumn};
use strata::{col, CoercionMode, EngineConfig, RawSchemaSpec, StrataError};

// =============================================================================
// Test Utilities
// =============================================================================

fn write_physical(dir: &std::path::Path, columns: Vec<(String, PhysicalColumn)>, rows: u64) {
    PartitionWriter::new()
        .write_physical(&dir.join("part-00000.scol"), rows, &columns)
        .expect("Failed to write partition");
}

// =============================================================================
// Widening Pairs
// =============================================================================

/// int32 on disk reads as int64 and float64 with identical values.
#[test]
fn test_int32_widens_to_int64_and_float64() {
    let dir = create_temp_dir();
    let values = vec![Some(i32::MIN), Some(-1), None, Some(0), Some(i32::MAX)];
    write_physical(
        dir.path(),
        vec![
            ("a".into(), PhysicalColumn::Int32(values.clone())),
            ("b".into(), PhysicalColumn::Int32(values.clone())),
        ],
        values.len() as u64,
    );

    let session = session(2);
    let spec = RawSchemaSpec::new().column("a", "int64").column("b", "float64");
    let dataset = session.open_dataset(dir.path(), &spec).unwrap();
    let plan = session.scan(&dataset, &["a", "b"]).unwrap();
    let table = session.to_memory(&plan).unwrap();

    for (row, original) in values.iter().enumerate() {
        let expected_int = original.map_or(Scalar::Null, |v| Scalar::Int64(i64::from(v)));
        let expected_float = original.map_or(Scalar::Null, |v| Scalar::Float64(f64::from(v)));
        assert_eq!(table.row(row).unwrap(), vec![expected_int, expected_float]);
    }
}

/// float32 reads as float64 exactly; date32 reads as a midnight timestamp.
#[test]
fn test_float32_and_date32_widen() {
    let dir = create_temp_dir();
    write_physical(
        dir.path(),
        vec![
            ("x".into(), PhysicalColumn::Float32(vec![Some(1.5), Some(-0.25), None])),
            ("d".into(), PhysicalColumn::Date32(vec![Some(0), Some(1), Some(19_782)])),
        ],
        3,
    );

    let session = session(1);
    let spec = RawSchemaSpec::new().column("x", "float64").column("d", "timestamp");
    let dataset = session.open_dataset(dir.path(), &spec).unwrap();
    let plan = session.scan(&dataset, &["x", "d"]).unwrap();
    let table = session.to_memory(&plan).unwrap();

    let x: Vec<Scalar> = table.column("x").unwrap().iter().collect();
    assert_eq!(x, vec![Scalar::Float64(1.5), Scalar::Float64(-0.25), Scalar::Null]);
    let d: Vec<Scalar> = table.column("d").unwrap().iter().collect();
    assert_eq!(
        d,
        vec![
            Scalar::Timestamp(0),
            Scalar::Timestamp(86_400_000_000),
            Scalar::Timestamp(19_782 * 86_400_000_000),
        ]
    );
}

/// Text read as typed columns parses every value in strict mode.
#[test]
fn test_text_parses_into_typed_columns() {
    let dir = create_temp_dir();
    write_physical(
        dir.path(),
        vec![
            (
                "n".into(),
                PhysicalColumn::Utf8(vec![Some("42".into()), Some(" 7 ".into()), None]),
            ),
            (
                "flag".into(),
                PhysicalColumn::Utf8(vec![Some("true".into()), Some("f".into()), Some("1".into())]),
            ),
        ],
        3,
    );

    let session = session(1);
    let spec = RawSchemaSpec::new().column("n", "int64").column("flag", "bool");
    let dataset = session.open_dataset(dir.path(), &spec).unwrap();
    let plan = session.scan(&dataset, &["n", "flag"]).unwrap();
    let table = session.to_memory(&plan).unwrap();

    assert_eq!(table.row(0).unwrap(), vec![Scalar::Int64(42), Scalar::Bool(true)]);
    assert_eq!(table.row(1).unwrap(), vec![Scalar::Int64(7), Scalar::Bool(false)]);
    assert_eq!(table.row(2).unwrap(), vec![Scalar::Null, Scalar::Bool(true)]);
}

// =============================================================================
// Rejected Conversions
// =============================================================================

/// int64 on disk cannot be read as int32; the failure names the partition.
#[test]
fn test_narrowing_fails_with_partition_path() {
    let dir = create_temp_dir();
    write_physical(
        dir.path(),
        vec![("v".into(), PhysicalColumn::Int64(vec![Some(1)]))],
        1,
    );

    let session = session(1);
    let spec = RawSchemaSpec::new().column("v", "int32");
    let dataset = session.open_dataset(dir.path(), &spec).unwrap();
    let plan = session.scan(&dataset, &["v"]).unwrap();
    let err = session.to_memory(&plan).unwrap_err();

    match err {
        StrataError::Materialize(e) => {
            assert_eq!(e.code(), "STRATA_EXEC_ABORTED");
            assert!(e.to_string().contains("part-00000.scol"), "got: {}", e);
        }
        other => panic!("expected materialize error, got {:?}", other),
    }
}

/// Unparseable text fails in strict mode and becomes null in best-effort
/// mode.
#[test]
fn test_best_effort_text_parsing() {
    let dir = create_temp_dir();
    write_physical(
        dir.path(),
        vec![(
            "n".into(),
            PhysicalColumn::Utf8(vec![Some("12".into()), Some("twelve".into())]),
        )],
        2,
    );
    let spec = RawSchemaSpec::new().column("n", "int64");

    let strict = session(1);
    let dataset = strict.open_dataset(dir.path(), &spec).unwrap();
    let plan = strict.scan(&dataset, &["n"]).unwrap();
    assert!(strict.to_memory(&plan).is_err());

    let lenient = common::session_with(
        EngineConfig::default()
            .with_workers(1)
            .with_coercion_mode(CoercionMode::BestEffort),
    );
    let dataset = lenient.open_dataset(dir.path(), &spec).unwrap();
    let plan = lenient
        .scan(&dataset, &["n"])
        .unwrap()
        .filter(col("n").is_not_null())
        .unwrap();
    let table = lenient.to_memory(&plan).unwrap();
    assert_eq!(table.num_rows(), 1);
    assert_eq!(table.row(0).unwrap(), vec![Scalar::Int64(12)]);
}

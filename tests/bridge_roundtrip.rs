//! Bridge Round-Trip Tests
//!
//! The same plan run entirely on the secondary engine produces the same
//! schema and values as on the primary engine. Constructs the primary
//! engine cannot run are delegated across the bridge.

mod common;

use common::{create_temp_dir, session, session_with, write_random_sales, write_sales_partition};
use strata::column::{Batch, ColumnBuffer, ColumnData, Scalar};
use strata::executor::CollectSink;
use strata::planner::{AggregateExpr, Engine};
use strata::storage::PartitionWriter;
use strata::{col, lit, EngineConfig, QueryPlan, RawSchemaSpec, Session, SortKey};

// =============================================================================
// Test Utilities
// =============================================================================

/// Runs `plan` on the primary engine through the materialization gate and
/// on the secondary engine directly, returning both batches
fn run_both(session: &Session, plan: &QueryPlan) -> (Batch, Batch) {
    let primary = session.to_memory(plan).unwrap().batch().clone();

    let mut sink = CollectSink::new();
    let stats = session.engine().execute_secondary(plan, &mut sink).unwrap();
    assert!(stats.delegated);
    let secondary = sink.into_batch(plan.schema()).unwrap();
    (primary, secondary)
}

fn write_region_codes(dir: &std::path::Path) {
    let batch = Batch::try_new(vec![
        ColumnBuffer::new(
            "region",
            ColumnData::Utf8(vec![Some("east".into()), Some("west".into())]),
        ),
        ColumnBuffer::new("code", ColumnData::Int64(vec![Some(1), Some(4)])),
    ])
    .unwrap();
    PartitionWriter::new()
        .write(&common::partition_path(dir, 0), &batch)
        .unwrap();
}

// =============================================================================
// Engine Equivalence
// =============================================================================

/// Filter, projection and grouped integer aggregates agree.
#[test]
fn test_aggregate_plan_matches() {
    let dir = create_temp_dir();
    write_random_sales(dir.path(), 6, 120, 42);
    let session = session(3);
    let dataset = session
        .open_dataset(dir.path(), &common::sales_spec())
        .unwrap();
    let plan = session
        .scan(&dataset, &["region", "amount", "price"])
        .unwrap()
        .filter(col("price").gt(lit(100.0)))
        .unwrap()
        .project(vec![
            col("region").into(),
            col("amount").mul(lit(2)).alias("doubled"),
        ])
        .unwrap()
        .aggregate(
            &["region"],
            vec![
                AggregateExpr::count_star(),
                AggregateExpr::sum(col("doubled")).alias("total"),
                AggregateExpr::min(col("doubled")).alias("low"),
                AggregateExpr::max(col("doubled")).alias("high"),
                AggregateExpr::distinct_count(col("doubled")).alias("distinct"),
            ],
        )
        .unwrap();

    let (primary, secondary) = run_both(&session, &plan);
    assert_eq!(primary.schema(), secondary.schema());
    assert_eq!(primary, secondary);
    assert_eq!(primary.num_rows(), common::REGIONS.len());
}

/// Sort and limit agree, including descending order and ties.
#[test]
fn test_sort_and_limit_match() {
    let dir = create_temp_dir();
    write_random_sales(dir.path(), 4, 50, 9);
    let session = session(2);
    let dataset = session
        .open_dataset(dir.path(), &common::sales_spec())
        .unwrap();
    let base = session.scan(&dataset, &["region", "amount"]).unwrap();

    let sorted = base
        .sort(vec![SortKey::asc("region"), SortKey::desc("amount")])
        .unwrap();
    let (primary, secondary) = run_both(&session, &sorted);
    assert_eq!(primary, secondary);
    assert_eq!(primary.num_rows(), 200);

    let limited = base.limit(17).unwrap();
    let (primary, secondary) = run_both(&session, &limited);
    assert_eq!(primary, secondary);
    assert_eq!(primary.num_rows(), 17);
}

// =============================================================================
// Delegation
// =============================================================================

/// LIKE is not a primary construct; `filter_or_delegate` moves it across.
#[test]
fn test_like_filter_is_delegated() {
    let dir = create_temp_dir();
    write_sales_partition(
        dir.path(),
        0,
        &[("east", Some(1), 1.0), ("north", Some(2), 2.0), ("west", Some(3), 3.0)],
    );
    write_sales_partition(dir.path(), 1, &[("south", Some(4), 4.0), ("east", Some(5), 5.0)]);
    let session = session(2);
    let dataset = session
        .open_dataset(dir.path(), &common::sales_spec())
        .unwrap();
    let scan = session.scan(&dataset, &["region", "amount"]).unwrap();

    let err = scan.filter(col("region").like("%st")).unwrap_err();
    assert_eq!(err.code(), "STRATA_PLAN_UNSUPPORTED_EXPRESSION");

    let plan = scan.filter_or_delegate(col("region").like("%st")).unwrap();
    assert_eq!(plan.engine(), Engine::Secondary);

    let table = session.to_memory(&plan).unwrap();
    assert!(table.stats().delegated);
    let amounts: Vec<Scalar> = table.column("amount").unwrap().iter().collect();
    assert_eq!(amounts, vec![Scalar::Int64(1), Scalar::Int64(3), Scalar::Int64(5)]);
}

/// String functions after delegation run on the secondary engine.
#[test]
fn test_delegated_projection() {
    let dir = create_temp_dir();
    write_sales_partition(dir.path(), 0, &[("east", Some(1), 1.0), ("north", Some(2), 2.0)]);
    let session = session(1);
    let dataset = session
        .open_dataset(dir.path(), &common::sales_spec())
        .unwrap();
    let plan = session
        .scan(&dataset, &["region"])
        .unwrap()
        .project_or_delegate(vec![
            col("region").upper().alias("loud"),
            col("region").length().alias("len"),
        ])
        .unwrap();

    let table = session.to_memory(&plan).unwrap();
    assert_eq!(
        table.row(0).unwrap(),
        vec![Scalar::Utf8("EAST".into()), Scalar::Int64(4)]
    );
    assert_eq!(
        table.row(1).unwrap(),
        vec![Scalar::Utf8("NORTH".into()), Scalar::Int64(5)]
    );
}

/// Joins require a delegated left side and keep left order.
#[test]
fn test_join_on_secondary() {
    let sales_dir = create_temp_dir();
    write_sales_partition(
        sales_dir.path(),
        0,
        &[("west", Some(10), 1.0), ("north", Some(20), 2.0), ("east", Some(30), 3.0)],
    );
    let codes_dir = create_temp_dir();
    write_region_codes(codes_dir.path());

    let session = session(2);
    let sales = session
        .open_dataset(sales_dir.path(), &common::sales_spec())
        .unwrap();
    let codes = session
        .open_dataset(
            codes_dir.path(),
            &RawSchemaSpec::new().column("region", "utf8").column("code", "int64"),
        )
        .unwrap();
    let left = session.scan(&sales, &["region", "amount"]).unwrap();
    let right = session.scan(&codes, &["region", "code"]).unwrap();

    assert!(left.join(&right, &[("region", "region")]).is_err());

    let plan = left.delegate().join(&right, &[("region", "region")]).unwrap();
    let names: Vec<&str> = plan.schema().names().collect();
    assert_eq!(names, vec!["region", "amount", "region_right", "code"]);

    let table = session.to_memory(&plan).unwrap();
    assert_eq!(table.num_rows(), 2);
    assert_eq!(
        table.row(0).unwrap(),
        vec![
            Scalar::Utf8("west".into()),
            Scalar::Int64(10),
            Scalar::Utf8("west".into()),
            Scalar::Int64(4),
        ]
    );
    assert_eq!(table.row(1).unwrap()[3], Scalar::Int64(1));
}

/// Inputs larger than the secondary row budget fail as incompatible.
#[test]
fn test_secondary_row_budget() {
    let dir = create_temp_dir();
    write_random_sales(dir.path(), 3, 40, 2);
    let session = session_with(
        EngineConfig::default()
            .with_workers(2)
            .with_secondary_max_rows(50),
    );
    let dataset = session
        .open_dataset(dir.path(), &common::sales_spec())
        .unwrap();
    let plan = session
        .scan(&dataset, &["region", "amount"])
        .unwrap()
        .filter_or_delegate(col("region").like("%"))
        .unwrap();

    let err = session.to_memory(&plan).unwrap_err();
    assert_eq!(err.code(), "STRATA_BRIDGE_INCOMPATIBLE_ENGINE");
}

/// The bridge can be driven directly with any sink.
#[test]
fn test_bridge_delegate_direct() {
    let dir = create_temp_dir();
    write_random_sales(dir.path(), 3, 30, 12);
    let session = session(2);
    let dataset = session
        .open_dataset(dir.path(), &common::sales_spec())
        .unwrap();
    let plan = session
        .scan(&dataset, &["region", "amount"])
        .unwrap()
        .delegate()
        .aggregate(&["region"], vec![AggregateExpr::sum(col("amount")).alias("total")])
        .unwrap();

    let engine = session.engine();
    let mut delegated = CollectSink::new();
    engine
        .bridge()
        .delegate(engine, &plan, &mut delegated)
        .unwrap();
    let mut whole = CollectSink::new();
    engine
        .bridge()
        .delegate_whole(engine, &plan, &mut whole)
        .unwrap();

    let delegated = delegated.into_batch(plan.schema()).unwrap();
    let whole = whole.into_batch(plan.schema()).unwrap();
    assert_eq!(delegated, whole);
    assert_eq!(delegated.num_rows(), common::REGIONS.len());
}

/// A join whose inputs fit the secondary row budget but whose output does
/// not fails as incompatible instead of growing without bound.
#[test]
fn test_secondary_join_output_budget() {
    let dir = create_temp_dir();
    let rows: Vec<(&str, Option<i64>, f64)> = (0..6).map(|i| ("east", Some(i), 1.0)).collect();
    write_sales_partition(dir.path(), 0, &rows);
    let session = session_with(
        EngineConfig::default()
            .with_workers(2)
            .with_secondary_max_rows(20),
    );
    let dataset = session
        .open_dataset(dir.path(), &common::sales_spec())
        .unwrap();
    let left = session.scan(&dataset, &["region", "amount"]).unwrap();
    let right = session.scan(&dataset, &["region", "price"]).unwrap();
    let plan = left.delegate().join(&right, &[("region", "region")]).unwrap();

    let err = session.to_memory(&plan).unwrap_err();
    assert_eq!(err.code(), "STRATA_BRIDGE_INCOMPATIBLE_ENGINE");

    let roomy = session_with(
        EngineConfig::default()
            .with_workers(2)
            .with_secondary_max_rows(36),
    );
    let dataset = roomy.open_dataset(dir.path(), &common::sales_spec()).unwrap();
    let left = roomy.scan(&dataset, &["region", "amount"]).unwrap();
    let right = roomy.scan(&dataset, &["region", "price"]).unwrap();
    let plan = left.delegate().join(&right, &[("region", "region")]).unwrap();
    assert_eq!(roomy.to_memory(&plan).unwrap().num_rows(), 36);
}

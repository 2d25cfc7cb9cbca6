//! Aggregate Determinism Tests
//!
//! Under a fixed partition order, aggregate results are bit-identical
//! across runs and worker counts. Under a shuffled order, count, min and
//! max are exact and floating sums and means agree within tolerance.

mod common;

use common::{create_temp_dir, session, session_with, write_random_sales};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use strata::catalog::DatasetHandle;
use strata::column::Scalar;
use strata::planner::AggregateExpr;
use strata::{col, EngineConfig, InMemoryTable, Session};

// =============================================================================
// Test Utilities
// =============================================================================

fn aggregates() -> Vec<AggregateExpr> {
    vec![
        AggregateExpr::count_star(),
        AggregateExpr::count(col("amount")).alias("amounts"),
        AggregateExpr::sum(col("amount")).alias("total"),
        AggregateExpr::sum(col("price")).alias("revenue"),
        AggregateExpr::mean(col("price")).alias("avg_price"),
        AggregateExpr::min(col("price")).alias("min_price"),
        AggregateExpr::max(col("amount")).alias("max_amount"),
        AggregateExpr::distinct_count(col("amount")).alias("distinct_amounts"),
    ]
}

fn run(session: &Session, dataset: &DatasetHandle) -> InMemoryTable {
    let plan = session
        .scan(dataset, &["region", "amount", "price"])
        .unwrap()
        .aggregate(&["region"], aggregates())
        .unwrap();
    session.to_memory(&plan).unwrap()
}

fn as_f64(value: &Scalar) -> f64 {
    value.as_f64().expect("numeric aggregate")
}

// =============================================================================
// Fixed Order
// =============================================================================

/// Repeated runs and different worker counts produce identical bits.
#[test]
fn test_fixed_order_is_bit_identical() {
    let dir = create_temp_dir();
    write_random_sales(dir.path(), 17, 300, 7);

    let baseline_session = session(1);
    let dataset = baseline_session
        .open_dataset(dir.path(), &common::sales_spec())
        .unwrap();
    let baseline = run(&baseline_session, &dataset);
    assert_eq!(baseline.num_rows(), common::REGIONS.len());

    for workers in [1, 2, 3, 8] {
        let s = session(workers);
        let dataset = s.open_dataset(dir.path(), &common::sales_spec()).unwrap();
        for _ in 0..2 {
            let table = run(&s, &dataset);
            assert_eq!(table.batch(), baseline.batch(), "workers = {}", workers);
            for row in 0..table.num_rows() {
                let a = table.row(row).unwrap();
                let b = baseline.row(row).unwrap();
                for (x, y) in a.iter().zip(&b) {
                    if let (Scalar::Float64(x), Scalar::Float64(y)) = (x, y) {
                        assert_eq!(x.to_bits(), y.to_bits());
                    }
                }
            }
        }
    }
}

/// Groups come out ordered by key.
#[test]
fn test_groups_sorted_by_key() {
    let dir = create_temp_dir();
    write_random_sales(dir.path(), 3, 100, 11);
    let s = session(2);
    let dataset = s.open_dataset(dir.path(), &common::sales_spec()).unwrap();
    let table = run(&s, &dataset);
    let regions: Vec<String> = table
        .column("region")
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect();
    assert_eq!(regions, common::REGIONS.to_vec());
}

// =============================================================================
// Shuffled Order
// =============================================================================

/// Shuffling partitions keeps exact aggregates exact and float aggregates
/// within tolerance.
#[test]
fn test_shuffled_order_within_tolerance() {
    let dir = create_temp_dir();
    write_random_sales(dir.path(), 23, 250, 99);

    let s = session(4);
    let dataset = s.open_dataset(dir.path(), &common::sales_spec()).unwrap();
    let baseline = run(&s, &dataset);

    let mut rng = StdRng::seed_from_u64(5);
    for _ in 0..3 {
        let mut order: Vec<usize> = (0..dataset.partition_count()).collect();
        order.shuffle(&mut rng);
        let shuffled = run(&s, &dataset.permuted(&order));
        assert_eq!(shuffled.schema(), baseline.schema());
        assert_eq!(shuffled.num_rows(), baseline.num_rows());

        for name in ["region", "count(*)", "amounts", "total", "min_price", "max_amount", "distinct_amounts"] {
            assert_eq!(
                shuffled.column(name).unwrap(),
                baseline.column(name).unwrap(),
                "column {} must be exact",
                name
            );
        }
        for name in ["revenue", "avg_price"] {
            let a: Vec<Scalar> = shuffled.column(name).unwrap().iter().collect();
            let b: Vec<Scalar> = baseline.column(name).unwrap().iter().collect();
            for (x, y) in a.iter().zip(&b) {
                let (x, y) = (as_f64(x), as_f64(y));
                let tolerance = 1e-9 * y.abs().max(1.0);
                assert!((x - y).abs() <= tolerance, "{}: {} vs {}", name, x, y);
            }
        }
    }
}

/// Merging partials as workers finish changes nothing for exact aggregates.
#[test]
fn test_unordered_merge_keeps_exact_aggregates() {
    let dir = create_temp_dir();
    write_random_sales(dir.path(), 12, 200, 3);

    let ordered = session(4);
    let dataset = ordered.open_dataset(dir.path(), &common::sales_spec()).unwrap();
    let expected = run(&ordered, &dataset);

    let unordered = session_with(
        EngineConfig::default()
            .with_workers(4)
            .with_deterministic_merge(false),
    );
    let dataset = unordered
        .open_dataset(dir.path(), &common::sales_spec())
        .unwrap();
    let actual = run(&unordered, &dataset);

    for name in ["region", "count(*)", "total", "max_amount", "distinct_amounts"] {
        assert_eq!(actual.column(name), expected.column(name), "column {}", name);
    }
}

/// A global aggregate over zero matching rows yields one row.
#[test]
fn test_global_aggregate_over_empty_input() {
    let dir = create_temp_dir();
    write_random_sales(dir.path(), 2, 50, 1);
    let s = session(2);
    let dataset = s.open_dataset(dir.path(), &common::sales_spec()).unwrap();
    let plan = s
        .scan(&dataset, &["amount"])
        .unwrap()
        .filter(col("amount").gt(strata::lit(1_000_000)))
        .unwrap()
        .aggregate::<&str>(
            &[],
            vec![AggregateExpr::count_star(), AggregateExpr::sum(col("amount")).alias("total")],
        )
        .unwrap();
    let table = s.to_memory(&plan).unwrap();
    assert_eq!(table.num_rows(), 1);
    assert_eq!(table.row(0).unwrap(), vec![Scalar::Int64(0), Scalar::Null]);
}

/// Exceeding max_groups fails the query.
#[test]
fn test_group_cardinality_limit() {
    let dir = create_temp_dir();
    write_random_sales(dir.path(), 2, 100, 8);
    let s = session_with(EngineConfig::default().with_workers(2).with_max_groups(3));
    let dataset = s.open_dataset(dir.path(), &common::sales_spec()).unwrap();
    let plan = s
        .scan(&dataset, &["region"])
        .unwrap()
        .aggregate(&["region"], vec![AggregateExpr::count_star()])
        .unwrap();
    let err = s.to_memory(&plan).unwrap_err();
    assert_eq!(err.code(), "STRATA_EXEC_GROUP_CARDINALITY");
}

/// A distinct count over more values than max_groups fails, even with a
/// single group.
#[test]
fn test_distinct_count_cardinality_limit() {
    let dir = create_temp_dir();
    write_random_sales(dir.path(), 3, 100, 21);
    let s = session_with(EngineConfig::default().with_workers(3).with_max_groups(8));
    let dataset = s.open_dataset(dir.path(), &common::sales_spec()).unwrap();
    let plan = s
        .scan(&dataset, &["amount"])
        .unwrap()
        .aggregate::<&str>(&[], vec![AggregateExpr::distinct_count(col("amount"))])
        .unwrap();
    let err = s.to_memory(&plan).unwrap_err();
    assert_eq!(err.code(), "STRATA_EXEC_GROUP_CARDINALITY");
}

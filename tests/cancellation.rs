//! Cancellation Tests
//!
//! Cancellation is observed at partition boundaries and reports how many
//! partitions completed. A reset token can run the next query.

mod common;

use common::{create_temp_dir, session, write_random_sales, CountingSink};
use strata::column::Batch;
use strata::executor::{BatchSink, CancellationToken, ExecError, SinkError, SinkState};
use strata::planner::AggregateExpr;
use strata::{col, lit};

// =============================================================================
// Test Utilities
// =============================================================================

/// Cancels the token once `after` batches have arrived
struct CancellingSink {
    token: CancellationToken,
    after: usize,
    seen: usize,
}

impl BatchSink for CancellingSink {
    fn push(&mut self, _batch: Batch) -> Result<SinkState, SinkError> {
        self.seen += 1;
        if self.seen == self.after {
            self.token.cancel();
        }
        Ok(SinkState::NeedMore)
    }
}

// =============================================================================
// Cancellation
// =============================================================================

/// A token cancelled before execution stops the query before any read.
#[test]
fn test_cancel_before_run() {
    let dir = create_temp_dir();
    write_random_sales(dir.path(), 4, 10, 1);
    let session = session(2);
    let dataset = session
        .open_dataset(dir.path(), &common::sales_spec())
        .unwrap();
    let plan = session.scan(&dataset, &["amount"]).unwrap();

    let token = session.cancellation_token();
    token.cancel();
    let mut sink = CountingSink::default();
    let err = session.engine().execute(&plan, &mut sink).unwrap_err();

    assert_eq!(
        err,
        ExecError::Cancelled {
            partitions_completed: 0
        }
    );
    assert_eq!(sink.rows, 0);
    assert!(session.io_counters().no_data_reads());
    token.reset();
}

/// Cancelling mid-run reports the partitions finished so far.
#[test]
fn test_cancel_mid_run() {
    let dir = create_temp_dir();
    write_random_sales(dir.path(), 5, 10, 2);
    let session = session(1);
    let dataset = session
        .open_dataset(dir.path(), &common::sales_spec())
        .unwrap();
    let plan = session
        .scan(&dataset, &["amount"])
        .unwrap()
        .filter(col("amount").gt_eq(lit(-1_000)))
        .unwrap();

    let mut sink = CancellingSink {
        token: session.cancellation_token(),
        after: 1,
        seen: 0,
    };
    let err = session.engine().execute(&plan, &mut sink).unwrap_err();
    assert_eq!(err.code(), "STRATA_EXEC_CANCELLED");
    assert_eq!(
        err,
        ExecError::Cancelled {
            partitions_completed: 1
        }
    );
    assert_eq!(sink.seen, 1);
}

/// After a reset the same session runs queries to completion.
#[test]
fn test_reset_allows_rerun() {
    let dir = create_temp_dir();
    write_random_sales(dir.path(), 3, 10, 3);
    let session = session(2);
    let dataset = session
        .open_dataset(dir.path(), &common::sales_spec())
        .unwrap();
    let plan = session
        .scan(&dataset, &["amount"])
        .unwrap()
        .aggregate::<&str>(&[], vec![AggregateExpr::count_star()])
        .unwrap();

    let token = session.cancellation_token();
    token.cancel();
    let err = session.to_memory(&plan).unwrap_err();
    assert_eq!(err.code(), "STRATA_EXEC_CANCELLED");

    token.reset();
    let table = session.to_memory(&plan).unwrap();
    assert_eq!(table.row(0).unwrap(), vec![strata::Scalar::Int64(30)]);
}

/// Delegated plans observe the same token.
#[test]
fn test_cancel_secondary() {
    let dir = create_temp_dir();
    write_random_sales(dir.path(), 3, 10, 4);
    let session = session(2);
    let dataset = session
        .open_dataset(dir.path(), &common::sales_spec())
        .unwrap();
    let plan = session
        .scan(&dataset, &["region"])
        .unwrap()
        .filter_or_delegate(col("region").like("%t"))
        .unwrap();

    let token = session.cancellation_token();
    token.cancel();
    let err = session.to_memory(&plan).unwrap_err();
    assert_eq!(err.code(), "STRATA_EXEC_CANCELLED");
    token.reset();
    assert!(session.to_memory(&plan).is_ok());
}

//! In-memory columnar values
//!
//! - `Scalar`: one value, shared by expressions, statistics and the row engine
//! - `ColumnBuffer`: one typed column over a run of rows
//! - `Batch`: equally long columns moved between operators

mod batch;
mod buffer;
mod scalar;

pub use batch::Batch;
pub use buffer::{ColumnBuffer, ColumnData};
pub use scalar::{
    date_to_days, days_to_date, days_to_timestamp_micros, ArithOp, CompareOp, Scalar, ScalarKey,
};


//! I/O module
//!
//! Handles CSV parsing and output.
//!
//! # Components
//!
//! - `csv_format` - CSV format handling (record conversion, output serialization)
//! - `async_reader` - Asynchronous readers for submissions and snapshots
//! - `snapshot` - Loading and atomically replacing the order snapshot file

pub mod async_reader;
pub mod csv_format;
pub mod snapshot;

pub use async_reader::{read_orders, AsyncReader};
pub use csv_format::{
    convert_snapshot_record, convert_submission, write_balances_csv, write_orders_csv,
    SnapshotRecord, Submission, SubmissionRecord,
};
pub use snapshot::{load_snapshot, save_snapshot};

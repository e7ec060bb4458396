//! Asynchronous CSV readers
//!
//! Provides a streaming interface over submission records and a strict
//! reader for order snapshots.
//!
//! # Design
//!
//! Both readers use:
//! - csv-async for streaming CSV parsing
//! - the csv_format module for record conversion
//!
//! Submissions come from users and are read leniently: a bad row is logged
//! and skipped. A snapshot is the durable order table, so any bad row fails
//! the whole read.
//!
//! # Architecture
//!
//! ```text
//! CSV Reader → AsyncReader  → Batches of Submissions
//! CSV Reader → read_orders  → Vec<Order> or LedgerError
//!                  ↓
//!           csv_format module
//! ```

use crate::io::csv_format::{
    convert_snapshot_record, convert_submission, SnapshotRecord, Submission, SubmissionRecord,
};
use crate::types::{LedgerError, Order};
use csv_async::AsyncReaderBuilder;
use futures::io::AsyncRead;
use futures::stream::StreamExt;
use tracing::warn;

fn reader_builder() -> AsyncReaderBuilder {
    let mut builder = AsyncReaderBuilder::new();
    builder.flexible(true).trim(csv_async::Trim::All);
    builder
}

/// Asynchronous submissions reader
///
/// Provides batch reading interface over `order,user` records.
/// Maintains streaming behavior with constant memory usage.
pub struct AsyncReader<R: AsyncRead + Unpin> {
    csv_reader: csv_async::AsyncDeserializer<R>,

    /// Data rows consumed so far, for error messages
    rows: u64,
}

impl<R: AsyncRead + Unpin + Send + 'static> AsyncReader<R> {
    /// Create a new AsyncReader from an async reader
    ///
    /// # Arguments
    ///
    /// * `reader` - Async reader providing CSV data
    pub fn new(reader: R) -> Self {
        Self {
            csv_reader: reader_builder().create_deserializer(reader),
            rows: 0,
        }
    }

    /// Read a batch of submissions
    ///
    /// Reads up to `batch_size` records, converting them to Submissions.
    /// Invalid records are logged and skipped.
    ///
    /// # Returns
    ///
    /// A vector of successfully converted submissions.
    /// Returns an empty vector when the end of the file is reached.
    pub async fn read_batch(&mut self, batch_size: usize) -> Vec<Submission> {
        let mut batch = Vec::with_capacity(batch_size);
        let mut records = self.csv_reader.deserialize::<SubmissionRecord>();

        while batch.len() < batch_size {
            let Some(next) = records.next().await else {
                break;
            };
            self.rows += 1;
            // Line 1 is the header
            let line = self.rows + 1;

            match next {
                Ok(record) => match convert_submission(record) {
                    Ok(submission) => batch.push(submission),
                    Err(e) => warn!(line, error = %e, "skipping submission"),
                },
                Err(e) => warn!(line, error = %e, "skipping unparsable submission row"),
            }
        }

        batch
    }
}

/// Read every order of a snapshot
///
/// # Returns
///
/// * `Ok(orders)` - All rows converted, in file order
/// * `Err(LedgerError::ParseError)` - The first bad row, with its line
pub async fn read_orders<R>(reader: R) -> Result<Vec<Order>, LedgerError>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut csv_reader = reader_builder().create_deserializer(reader);
    let mut records = csv_reader.deserialize::<SnapshotRecord>();
    let mut orders = Vec::new();
    let mut line = 1;

    while let Some(next) = records.next().await {
        line += 1;
        let record = next.map_err(|e| LedgerError::parse(Some(line), e.to_string()))?;
        let order = convert_snapshot_record(record).map_err(|e| LedgerError::parse(Some(line), e))?;
        orders.push(order);
    }

    Ok(orders)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OrderStatus;
    use futures::io::Cursor;
    use rust_decimal::Decimal;

    #[tokio::test]
    async fn test_read_batch() {
        let csv_content = "order,user\nA1,u1\nA2,u1\nA3,u2\n";
        let mut reader = AsyncReader::new(Cursor::new(csv_content.as_bytes()));

        let batch = reader.read_batch(2).await;
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].order_id, "A1");
        assert_eq!(batch[1].order_id, "A2");

        let batch = reader.read_batch(2).await;
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].order_id, "A3");
        assert_eq!(batch[0].user_id, "u2");

        assert!(reader.read_batch(2).await.is_empty());
    }

    #[tokio::test]
    async fn test_read_batch_empty_csv() {
        let mut reader = AsyncReader::new(Cursor::new("order,user\n".as_bytes()));
        assert!(reader.read_batch(10).await.is_empty());
    }

    #[tokio::test]
    async fn test_read_batch_skips_invalid_rows() {
        let csv_content = "order,user\n,u1\nA2,u1\nA3,\nA4,u2\n";
        let mut reader = AsyncReader::new(Cursor::new(csv_content.as_bytes()));

        let batch = reader.read_batch(10).await;
        let ids: Vec<&str> = batch.iter().map(|s| s.order_id.as_str()).collect();
        assert_eq!(ids, vec!["A2", "A4"]);
    }

    #[tokio::test]
    async fn test_read_batch_whitespace_handling() {
        let csv_content = "order,user\n  A1  ,  u1  \n";
        let mut reader = AsyncReader::new(Cursor::new(csv_content.as_bytes()));

        let batch = reader.read_batch(10).await;
        assert_eq!(batch[0].order_id, "A1");
        assert_eq!(batch[0].user_id, "u1");
    }

    #[tokio::test]
    async fn test_read_orders() {
        let csv_content = "order,user,status,accrual,uploaded_at,updated_at\n\
            A1,u1,PROCESSED,500,2024-03-01T10:00:00Z,2024-03-01T10:01:00Z\n\
            A2,u1,PROCESSING,,2024-03-01T10:02:00Z,2024-03-01T10:02:30Z\n";

        let orders = read_orders(Cursor::new(csv_content.as_bytes()))
            .await
            .unwrap();

        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0].status, OrderStatus::Processed);
        assert_eq!(orders[0].accrual, Decimal::new(500, 0));
        assert_eq!(orders[1].status, OrderStatus::Processing);
        assert_eq!(orders[1].accrual, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_read_orders_fails_on_bad_row() {
        let csv_content = "order,user,status,accrual,uploaded_at,updated_at\n\
            A1,u1,NEW,,2024-03-01T10:00:00Z,2024-03-01T10:00:00Z\n\
            A2,u1,LOST,,2024-03-01T10:00:00Z,2024-03-01T10:00:00Z\n";

        let result = read_orders(Cursor::new(csv_content.as_bytes())).await;

        match result {
            Err(LedgerError::ParseError { line, message }) => {
                assert_eq!(line, Some(3));
                assert!(message.contains("LOST"));
            }
            other => panic!("expected a parse error, got {:?}", other),
        }
    }
}

//! CSV format handling for submissions, order snapshots and balance reports
//!
//! This module centralizes all CSV format concerns, providing:
//! - Record structures for deserialization
//! - Conversion from CSV records to domain types
//! - Snapshot and balance report serialization
//!
//! All functions are pure (no I/O) for easy testing.
//!
//! # Formats
//!
//! ```text
//! submissions:  order,user
//! snapshot:     order,user,status,accrual,uploaded_at,updated_at
//! report:       user,available,withdrawn
//! ```
//!
//! Timestamps are RFC 3339 in UTC.

use crate::types::{Balance, Order, OrderId, OrderStatus, UserId};
use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Write;
use std::str::FromStr;

/// One row of the submissions file
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct SubmissionRecord {
    pub order: String,
    pub user: String,
}

/// An order handed to the engine by a user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub order_id: OrderId,
    pub user_id: UserId,
}

/// One row of the order snapshot
///
/// Every column is read as text and validated by
/// [`convert_snapshot_record`] so errors can name the offending value.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct SnapshotRecord {
    pub order: String,
    pub user: String,
    pub status: String,
    pub accrual: Option<String>,
    pub uploaded_at: String,
    pub updated_at: String,
}

/// Convert a SubmissionRecord to a Submission
///
/// Both fields must be non-empty after trimming and the order number may
/// not contain whitespace.
///
/// # Returns
///
/// Result containing either:
/// - Ok(Submission) - Successfully converted record
/// - Err(String) - Error message describing the conversion failure
pub fn convert_submission(record: SubmissionRecord) -> Result<Submission, String> {
    let order_id = record.order.trim();
    let user_id = record.user.trim();

    if order_id.is_empty() {
        return Err(format!("Missing order number for user '{}'", user_id));
    }
    if order_id.chars().any(char::is_whitespace) {
        return Err(format!("Invalid order number '{}'", order_id));
    }
    if user_id.is_empty() {
        return Err(format!("Missing user for order {}", order_id));
    }

    Ok(Submission {
        order_id: order_id.to_string(),
        user_id: user_id.to_string(),
    })
}

fn parse_timestamp(value: &str, column: &str, order: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| format!("Invalid {} '{}' for order {}: {}", column, value, order, e))
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Convert a SnapshotRecord to an Order
///
/// This function:
/// - Parses the status with the persisted vocabulary
/// - Parses the accrual (empty means zero) and rejects negative values
/// - Rejects a non-zero accrual on an order that is not `PROCESSED`
/// - Parses both timestamps as RFC 3339
pub fn convert_snapshot_record(record: SnapshotRecord) -> Result<Order, String> {
    let order_id = record.order.trim();
    let user_id = record.user.trim();
    if order_id.is_empty() || user_id.is_empty() {
        return Err(format!(
            "Snapshot row needs an order and a user, got '{}' / '{}'",
            record.order, record.user
        ));
    }

    let status = OrderStatus::from_str(&record.status)
        .map_err(|e| format!("{} for order {}", e, order_id))?;

    let accrual = match record.accrual.as_deref().map(str::trim) {
        Some(value) if !value.is_empty() => Decimal::from_str(value)
            .map_err(|_| format!("Invalid accrual '{}' for order {}", value, order_id))?,
        _ => Decimal::ZERO,
    };
    if accrual < Decimal::ZERO {
        return Err(format!("Negative accrual {} for order {}", accrual, order_id));
    }
    if !accrual.is_zero() && status != OrderStatus::Processed {
        return Err(format!(
            "Order {} is {} but carries accrual {}",
            order_id, status, accrual
        ));
    }

    Ok(Order {
        id: order_id.to_string(),
        user_id: user_id.to_string(),
        status,
        accrual,
        uploaded_at: parse_timestamp(&record.uploaded_at, "uploaded_at", order_id)?,
        updated_at: parse_timestamp(&record.updated_at, "updated_at", order_id)?,
    })
}

/// Write orders in snapshot format
///
/// Orders are sorted by upload time, then identifier, for deterministic
/// output.
///
/// # Returns
///
/// * `Ok(())` if writing succeeded
/// * `Err(String)` if a write error occurred
pub fn write_orders_csv(orders: &[Order], output: &mut dyn Write) -> Result<(), String> {
    let mut writer = csv::Writer::from_writer(output);

    writer
        .write_record([
            "order",
            "user",
            "status",
            "accrual",
            "uploaded_at",
            "updated_at",
        ])
        .map_err(|e| format!("Failed to write CSV header: {}", e))?;

    let mut sorted: Vec<&Order> = orders.iter().collect();
    sorted.sort_by(|a, b| {
        a.uploaded_at
            .cmp(&b.uploaded_at)
            .then_with(|| a.id.cmp(&b.id))
    });

    for order in sorted {
        writer
            .write_record(&[
                order.id.clone(),
                order.user_id.clone(),
                order.status.to_string(),
                order.accrual.normalize().to_string(),
                format_timestamp(&order.uploaded_at),
                format_timestamp(&order.updated_at),
            ])
            .map_err(|e| format!("Failed to write order record: {}", e))?;
    }

    writer
        .flush()
        .map_err(|e| format!("Failed to flush output: {}", e))?;

    Ok(())
}

/// Write balances in report format
///
/// Writes balances with columns: user, available, withdrawn, sorted by user
/// for deterministic output. Amounts have two decimal places.
pub fn write_balances_csv(balances: &[Balance], output: &mut dyn Write) -> Result<(), String> {
    let mut writer = csv::Writer::from_writer(output);

    writer
        .write_record(["user", "available", "withdrawn"])
        .map_err(|e| format!("Failed to write CSV header: {}", e))?;

    let mut sorted = balances.to_vec();
    sorted.sort_by(|a, b| a.user_id.cmp(&b.user_id));

    for balance in sorted {
        writer
            .write_record(&[
                balance.user_id,
                format!("{:.2}", balance.available),
                format!("{:.2}", balance.withdrawn),
            ])
            .map_err(|e| format!("Failed to write balance record: {}", e))?;
    }

    writer
        .flush()
        .map_err(|e| format!("Failed to flush output: {}", e))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    fn snapshot_record(status: &str, accrual: Option<&str>) -> SnapshotRecord {
        SnapshotRecord {
            order: "A1".to_string(),
            user: "u1".to_string(),
            status: status.to_string(),
            accrual: accrual.map(str::to_string),
            uploaded_at: "2024-03-01T10:00:00Z".to_string(),
            updated_at: "2024-03-01T10:05:00.5Z".to_string(),
        }
    }

    #[rstest]
    #[case::plain("12345678903", "user-1")]
    #[case::padded("  12345678903 ", " user-1  ")]
    fn test_convert_submission_valid(#[case] order: &str, #[case] user: &str) {
        let submission = convert_submission(SubmissionRecord {
            order: order.to_string(),
            user: user.to_string(),
        })
        .unwrap();

        assert_eq!(submission.order_id, "12345678903");
        assert_eq!(submission.user_id, "user-1");
    }

    #[rstest]
    #[case::empty_order("", "u1", "Missing order number")]
    #[case::blank_order("   ", "u1", "Missing order number")]
    #[case::inner_space("123 456", "u1", "Invalid order number")]
    #[case::empty_user("A1", "", "Missing user")]
    fn test_convert_submission_errors(
        #[case] order: &str,
        #[case] user: &str,
        #[case] expected_error: &str,
    ) {
        let result = convert_submission(SubmissionRecord {
            order: order.to_string(),
            user: user.to_string(),
        });
        assert!(result.unwrap_err().contains(expected_error));
    }

    #[test]
    fn test_convert_snapshot_record_processed() {
        let order = convert_snapshot_record(snapshot_record("PROCESSED", Some("500.5"))).unwrap();

        assert_eq!(order.id, "A1");
        assert_eq!(order.user_id, "u1");
        assert_eq!(order.status, OrderStatus::Processed);
        assert_eq!(order.accrual, Decimal::new(5005, 1));
        assert_eq!(
            order.uploaded_at,
            Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()
        );
        assert_eq!(
            order.updated_at - order.uploaded_at,
            chrono::Duration::milliseconds(300_500)
        );
    }

    #[rstest]
    #[case::missing_accrual("NEW", None)]
    #[case::empty_accrual("PROCESSING", Some(""))]
    #[case::zero_accrual("INVALID", Some("0"))]
    fn test_convert_snapshot_record_zero_accrual(
        #[case] status: &str,
        #[case] accrual: Option<&str>,
    ) {
        let order = convert_snapshot_record(snapshot_record(status, accrual)).unwrap();
        assert_eq!(order.accrual, Decimal::ZERO);
    }

    #[rstest]
    #[case::unknown_status("REGISTERED", Some("0"), "Unknown order status")]
    #[case::bad_accrual("PROCESSED", Some("lots"), "Invalid accrual")]
    #[case::negative_accrual("PROCESSED", Some("-1"), "Negative accrual")]
    #[case::accrual_on_new("NEW", Some("10"), "carries accrual")]
    fn test_convert_snapshot_record_errors(
        #[case] status: &str,
        #[case] accrual: Option<&str>,
        #[case] expected_error: &str,
    ) {
        let result = convert_snapshot_record(snapshot_record(status, accrual));
        assert!(result.unwrap_err().contains(expected_error));
    }

    #[test]
    fn test_convert_snapshot_record_bad_timestamp() {
        let mut record = snapshot_record("NEW", None);
        record.uploaded_at = "yesterday".to_string();

        let result = convert_snapshot_record(record);
        assert!(result.unwrap_err().contains("Invalid uploaded_at"));
    }

    #[test]
    fn test_write_orders_csv_sorted_by_upload_time() {
        let early = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2024, 3, 1, 11, 0, 0).unwrap();
        let orders = vec![
            Order::new("B2", "u2", late),
            Order::new("A1", "u1", early).advanced(
                OrderStatus::Processed,
                Decimal::new(50000, 2),
                late,
            ),
        ];

        let mut output = Vec::new();
        write_orders_csv(&orders, &mut output).unwrap();

        assert_eq!(
            String::from_utf8(output).unwrap(),
            "order,user,status,accrual,uploaded_at,updated_at\n\
             A1,u1,PROCESSED,500,2024-03-01T10:00:00Z,2024-03-01T11:00:00Z\n\
             B2,u2,NEW,0,2024-03-01T11:00:00Z,2024-03-01T11:00:00Z\n"
        );
    }

    #[rstest]
    #[case::single(
        vec![Balance { user_id: "u1".to_string(), available: Decimal::new(500, 0), withdrawn: Decimal::ZERO }],
        "user,available,withdrawn\nu1,500.00,0.00\n"
    )]
    #[case::sorted_by_user(
        vec![
            Balance { user_id: "u2".to_string(), available: Decimal::new(72950, 2), withdrawn: Decimal::new(75125, 2) },
            Balance::new("u1"),
        ],
        "user,available,withdrawn\nu1,0.00,0.00\nu2,729.50,751.25\n"
    )]
    #[case::empty(vec![], "user,available,withdrawn\n")]
    fn test_write_balances_csv(#[case] balances: Vec<Balance>, #[case] expected_output: &str) {
        let mut output = Vec::new();
        write_balances_csv(&balances, &mut output).unwrap();

        assert_eq!(String::from_utf8(output).unwrap(), expected_output);
    }
}

//! Error types for the loyalty reconciler
//!
//! This module defines all error types that can occur while persisting orders,
//! moving balances, and reading or writing snapshot files.
//!
//! # Error Categories
//!
//! - **Caller Errors**: Duplicate orders, insufficient funds, invalid amounts.
//!   Surfaced immediately and never retried.
//! - **Lifecycle Errors**: Unknown orders and backward status transitions.
//!   An update batch containing one is rolled back as a whole.
//! - **Storage Errors**: Infrastructure failures and write deadlines. The
//!   caller of the failed write retries it.
//! - **File Errors**: Snapshot and submission file I/O and parsing.

use super::order::{OrderId, OrderStatus, UserId};
use rust_decimal::Decimal;
use std::time::Duration;
use thiserror::Error;

/// Main error type for the ledger and reconciliation engine
///
/// Oracle failures are not represented here: the oracle client folds them
/// into `OracleOutcome::TransientFailure`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    /// The order identifier is already taken
    ///
    /// `same_user` tells whether the existing order belongs to the submitter.
    #[error(
        "Order {order} was already submitted{}",
        if *same_user { " by this user" } else { " by another user" }
    )]
    DuplicateOrder {
        /// The duplicated order identifier
        order: OrderId,
        /// Whether the existing order belongs to the same user
        same_user: bool,
    },

    /// An update referenced an order that was never created
    #[error("Order {order} not found")]
    OrderNotFound {
        /// The unknown order identifier
        order: OrderId,
    },

    /// An update would move an order backward or out of a terminal status
    #[error("Illegal transition for order {order}: {from} -> {to}")]
    IllegalTransition {
        /// The order being updated
        order: OrderId,
        /// Currently persisted status
        from: OrderStatus,
        /// Requested status
        to: OrderStatus,
    },

    /// Insufficient available points for a withdrawal
    ///
    /// The balance is left unchanged.
    #[error("Insufficient funds for user {user}: available {available}, requested {requested}")]
    InsufficientFunds {
        /// User ID
        user: UserId,
        /// Available balance
        available: Decimal,
        /// Requested withdrawal amount
        requested: Decimal,
    },

    /// Amount is negative, or zero where a positive amount is required
    #[error("Invalid amount {amount} for {operation}")]
    InvalidAmount {
        /// The rejected amount
        amount: Decimal,
        /// Operation that rejected it
        operation: String,
    },

    /// Arithmetic overflow would occur
    #[error("Arithmetic overflow in {operation} for user {user}")]
    ArithmeticOverflow {
        /// Operation that would overflow
        operation: String,
        /// User ID
        user: UserId,
    },

    /// The backing store failed
    #[error("Storage error: {message}")]
    StorageError {
        /// Description of the failure
        message: String,
    },

    /// A persistence write did not finish within its deadline
    #[error("Storage timeout after {timeout:?} in {operation}")]
    StorageTimeout {
        /// Operation that timed out
        operation: String,
        /// The deadline that elapsed
        timeout: Duration,
    },

    /// I/O error occurred while reading or writing files
    #[error("I/O error: {message}")]
    IoError {
        /// Description of the I/O error
        message: String,
    },

    /// CSV parsing error occurred
    #[error("CSV parse error{}: {message}", line.map(|l| format!(" at line {}", l)).unwrap_or_default())]
    ParseError {
        /// Line number where the error occurred (if available)
        line: Option<u64>,
        /// Description of the parsing error
        message: String,
    },
}

impl From<std::io::Error> for LedgerError {
    fn from(error: std::io::Error) -> Self {
        LedgerError::IoError {
            message: error.to_string(),
        }
    }
}

impl LedgerError {
    /// Whether the failed operation may succeed if simply tried again
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LedgerError::StorageError { .. } | LedgerError::StorageTimeout { .. }
        )
    }

    /// Create a DuplicateOrder error
    pub fn duplicate_order(order: &str, same_user: bool) -> Self {
        LedgerError::DuplicateOrder {
            order: order.to_string(),
            same_user,
        }
    }

    /// Create an OrderNotFound error
    pub fn order_not_found(order: &str) -> Self {
        LedgerError::OrderNotFound {
            order: order.to_string(),
        }
    }

    /// Create an IllegalTransition error
    pub fn illegal_transition(order: &str, from: OrderStatus, to: OrderStatus) -> Self {
        LedgerError::IllegalTransition {
            order: order.to_string(),
            from,
            to,
        }
    }

    /// Create an InsufficientFunds error
    pub fn insufficient_funds(user: &str, available: Decimal, requested: Decimal) -> Self {
        LedgerError::InsufficientFunds {
            user: user.to_string(),
            available,
            requested,
        }
    }

    /// Create an InvalidAmount error
    pub fn invalid_amount(amount: Decimal, operation: &str) -> Self {
        LedgerError::InvalidAmount {
            amount,
            operation: operation.to_string(),
        }
    }

    /// Create an ArithmeticOverflow error
    pub fn arithmetic_overflow(operation: &str, user: &str) -> Self {
        LedgerError::ArithmeticOverflow {
            operation: operation.to_string(),
            user: user.to_string(),
        }
    }

    /// Create a StorageError
    pub fn storage(message: impl Into<String>) -> Self {
        LedgerError::StorageError {
            message: message.into(),
        }
    }

    /// Create a StorageTimeout error
    pub fn storage_timeout(operation: &str, timeout: Duration) -> Self {
        LedgerError::StorageTimeout {
            operation: operation.to_string(),
            timeout,
        }
    }

    /// Create a ParseError
    pub fn parse(line: Option<u64>, message: impl Into<String>) -> Self {
        LedgerError::ParseError {
            line,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::duplicate_same_user(
        LedgerError::duplicate_order("A1", true),
        "Order A1 was already submitted by this user"
    )]
    #[case::duplicate_other_user(
        LedgerError::duplicate_order("A1", false),
        "Order A1 was already submitted by another user"
    )]
    #[case::order_not_found(
        LedgerError::order_not_found("A9"),
        "Order A9 not found"
    )]
    #[case::illegal_transition(
        LedgerError::illegal_transition("A1", OrderStatus::Processed, OrderStatus::New),
        "Illegal transition for order A1: PROCESSED -> NEW"
    )]
    #[case::insufficient_funds(
        LedgerError::insufficient_funds("u1", Decimal::new(5000, 2), Decimal::new(10000, 2)),
        "Insufficient funds for user u1: available 50.00, requested 100.00"
    )]
    #[case::invalid_amount(
        LedgerError::invalid_amount(Decimal::new(-1, 0), "withdrawal"),
        "Invalid amount -1 for withdrawal"
    )]
    #[case::storage(
        LedgerError::storage("connection reset"),
        "Storage error: connection reset"
    )]
    #[case::storage_timeout(
        LedgerError::storage_timeout("update_orders", Duration::from_millis(200)),
        "Storage timeout after 200ms in update_orders"
    )]
    #[case::parse_error_with_line(
        LedgerError::parse(Some(3), "bad status"),
        "CSV parse error at line 3: bad status"
    )]
    #[case::parse_error_without_line(
        LedgerError::parse(None, "bad status"),
        "CSV parse error: bad status"
    )]
    fn test_error_display(#[case] error: LedgerError, #[case] expected: &str) {
        assert_eq!(error.to_string(), expected);
    }

    #[rstest]
    #[case::storage(LedgerError::storage("down"), true)]
    #[case::timeout(LedgerError::storage_timeout("create_order", Duration::from_millis(1)), true)]
    #[case::duplicate(LedgerError::duplicate_order("A1", false), false)]
    #[case::insufficient(LedgerError::insufficient_funds("u1", Decimal::ZERO, Decimal::ONE), false)]
    #[case::illegal(LedgerError::illegal_transition("A1", OrderStatus::Invalid, OrderStatus::New), false)]
    fn test_is_retryable(#[case] error: LedgerError, #[case] retryable: bool) {
        assert_eq!(error.is_retryable(), retryable);
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error =
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "Permission denied");
        let error: LedgerError = io_error.into();
        assert!(matches!(error, LedgerError::IoError { .. }));
        assert_eq!(error.to_string(), "I/O error: Permission denied");
    }
}

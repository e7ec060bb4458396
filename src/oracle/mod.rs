//! Accrual oracle contract
//!
//! The oracle is the external, independently operated and rate-limited
//! service that decides whether an order earns points. One query returns
//! exactly one `OracleOutcome`; transport and server failures are folded
//! into `TransientFailure` so callers only ever see outcomes.

pub mod http;
pub mod scripted;

pub use http::HttpAccrualClient;
pub use scripted::ScriptedOracle;

use crate::types::OrderStatus;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

/// Longest rate-limit pause accepted from the oracle; longer hints are cut down
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(60 * 60);

/// Order status vocabulary of the oracle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OracleStatus {
    Registered,
    Processing,
    Invalid,
    Processed,
}

impl OracleStatus {
    /// The persisted status this oracle status maps to
    ///
    /// `REGISTERED` and `PROCESSING` share the `PROCESSING` bucket.
    pub fn persisted(self) -> OrderStatus {
        match self {
            OracleStatus::Registered | OracleStatus::Processing => OrderStatus::Processing,
            OracleStatus::Invalid => OrderStatus::Invalid,
            OracleStatus::Processed => OrderStatus::Processed,
        }
    }
}

impl fmt::Display for OracleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OracleStatus::Registered => "REGISTERED",
            OracleStatus::Processing => "PROCESSING",
            OracleStatus::Invalid => "INVALID",
            OracleStatus::Processed => "PROCESSED",
        };
        f.write_str(s)
    }
}

/// Result of a single oracle query
#[derive(Debug, Clone, PartialEq)]
pub enum OracleOutcome {
    /// The oracle has information about the order
    Scored {
        status: OracleStatus,
        /// Non-negative; zero unless the status is `PROCESSED`
        accrual: Decimal,
    },

    /// The oracle has no record of the order yet
    Unknown,

    /// The oracle is throttling; no query to any order until the hint elapses
    RateLimited { retry_after: Duration },

    /// Network failure, server error, or a response that could not be understood
    TransientFailure { reason: String },
}

impl OracleOutcome {
    pub fn transient(reason: impl Into<String>) -> Self {
        OracleOutcome::TransientFailure {
            reason: reason.into(),
        }
    }
}

/// Source of order scores
#[async_trait]
pub trait AccrualOracle: Send + Sync {
    /// Ask the oracle for the current status of one order
    async fn query(&self, order_id: &str) -> OracleOutcome;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(OracleStatus::Registered, OrderStatus::Processing)]
    #[case(OracleStatus::Processing, OrderStatus::Processing)]
    #[case(OracleStatus::Invalid, OrderStatus::Invalid)]
    #[case(OracleStatus::Processed, OrderStatus::Processed)]
    fn test_persisted_status_mapping(#[case] oracle: OracleStatus, #[case] expected: OrderStatus) {
        assert_eq!(oracle.persisted(), expected);
    }

    #[test]
    fn test_status_deserializes_from_uppercase() {
        let status: OracleStatus = serde_json::from_str("\"REGISTERED\"").unwrap();
        assert_eq!(status, OracleStatus::Registered);
        assert!(serde_json::from_str::<OracleStatus>("\"NEW\"").is_err());
    }
}

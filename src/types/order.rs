//! Order-related types for the loyalty reconciler
//!
//! This module defines the order record, its four-state lifecycle and the
//! identifier aliases used throughout the system.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Order identifier
///
/// Externally assigned order number. Globally unique, it doubles as the
/// natural key of the orders table and as the idempotency key for accrual
/// credits.
pub type OrderId = String;

/// User identifier
pub type UserId = String;

/// Persisted order lifecycle
///
/// Orders only move forward: `NEW → PROCESSING → {INVALID | PROCESSED}` or
/// straight from `NEW` to a terminal status. `INVALID` and `PROCESSED` are
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    /// Accepted from the user, not yet seen by the oracle
    New,

    /// The oracle knows the order but has not scored it yet
    Processing,

    /// The oracle rejected the order; no accrual is paid
    Invalid,

    /// The oracle scored the order; accrual has been credited
    Processed,
}

impl OrderStatus {
    /// Whether no further transitions can happen from this status
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Invalid | OrderStatus::Processed)
    }

    fn rank(self) -> u8 {
        match self {
            OrderStatus::New => 0,
            OrderStatus::Processing => 1,
            OrderStatus::Invalid | OrderStatus::Processed => 2,
        }
    }

    /// Whether an order currently in `self` may be persisted as `next`
    ///
    /// Re-persisting a non-terminal status (a timestamp refresh) is allowed.
    /// Nothing is allowed out of a terminal status, including re-persisting it.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        !self.is_terminal() && next.rank() >= self.rank()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::New => "NEW",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Invalid => "INVALID",
            OrderStatus::Processed => "PROCESSED",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "NEW" => Ok(OrderStatus::New),
            "PROCESSING" => Ok(OrderStatus::Processing),
            "INVALID" => Ok(OrderStatus::Invalid),
            "PROCESSED" => Ok(OrderStatus::Processed),
            other => Err(format!("Unknown order status '{}'", other)),
        }
    }
}

/// A purchase order submitted for point accrual
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Externally assigned order number
    pub id: OrderId,

    /// The user who submitted the order
    pub user_id: UserId,

    /// Current lifecycle status
    pub status: OrderStatus,

    /// Points paid for the order
    ///
    /// Only meaningful once the order is `PROCESSED`; zero otherwise.
    pub accrual: Decimal,

    /// When the order was first accepted
    pub uploaded_at: DateTime<Utc>,

    /// When the order record was last written
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Create a freshly submitted order in the `NEW` status
    pub fn new(id: impl Into<OrderId>, user_id: impl Into<UserId>, now: DateTime<Utc>) -> Self {
        Order {
            id: id.into(),
            user_id: user_id.into(),
            status: OrderStatus::New,
            accrual: Decimal::ZERO,
            uploaded_at: now,
            updated_at: now,
        }
    }

    /// Copy of this order moved to `status` with the given accrual
    pub fn advanced(&self, status: OrderStatus, accrual: Decimal, now: DateTime<Utc>) -> Self {
        Order {
            status,
            accrual,
            updated_at: now,
            ..self.clone()
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

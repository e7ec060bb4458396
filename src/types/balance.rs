//! Balance-related types for the loyalty reconciler
//!
//! This module defines the per-user balance snapshot and the withdrawal
//! records kept alongside it.

use super::order::{OrderId, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

/// User balance state
///
/// One balance row exists per user. `available` never goes negative and
/// `withdrawn` never decreases.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Balance {
    /// The owning user
    pub user_id: UserId,

    /// Points that can still be spent
    pub available: Decimal,

    /// Total points spent through withdrawals
    pub withdrawn: Decimal,
}

impl Balance {
    /// Create an empty balance for a user
    ///
    /// # Returns
    ///
    /// A new Balance with:
    /// - available = 0
    /// - withdrawn = 0
    pub fn new(user_id: impl Into<UserId>) -> Self {
        Balance {
            user_id: user_id.into(),
            available: Decimal::ZERO,
            withdrawn: Decimal::ZERO,
        }
    }
}

/// A completed withdrawal
///
/// Points spent against an order number, recorded at the moment the
/// withdrawal was applied.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Withdrawal {
    /// The order number the points were spent on
    pub order: OrderId,

    /// Amount moved from available to withdrawn
    pub sum: Decimal,

    pub processed_at: DateTime<Utc>,
}

//! Durable state consumed by the reconciliation engine
//!
//! This module defines the storage contracts the engine depends on and
//! the in-memory implementations used by the binary and the tests:
//! - `OrderStore` - order persistence keyed by order identifier
//! - `BalanceLedger` - per-user balances and withdrawals
//! - `predicate` - structured predicates for reading orders
//!
//! Every cross-task guarantee the engine relies on (duplicate rejection,
//! atomic batch updates, atomic check-and-withdraw) comes from these
//! contracts rather than from in-memory locks in the engine.

pub mod balance_ledger;
pub mod order_store;
pub mod predicate;

pub use balance_ledger::InMemoryBalanceLedger;
pub use order_store::InMemoryOrderStore;
pub use predicate::{Comparison, OrderPredicate};

use crate::types::{Balance, LedgerError, Order, Withdrawal};
use async_trait::async_trait;
use rust_decimal::Decimal;

/// Order persistence
///
/// The orders table doubles as the reconciliation work queue: anything not
/// yet terminal is still owed a reconciliation task.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persist a new order
    ///
    /// Fails with `DuplicateOrder` if the identifier already exists.
    async fn create_order(&self, order: Order) -> Result<(), LedgerError>;

    /// Read every order matching the predicate, oldest upload first
    async fn read_orders(&self, predicate: &OrderPredicate) -> Result<Vec<Order>, LedgerError>;

    /// Apply status, accrual and timestamp updates for one or more orders
    ///
    /// All-or-nothing: if any update fails validation none is applied.
    async fn update_orders(&self, orders: &[Order]) -> Result<(), LedgerError>;
}

/// Per-user balance ledger
///
/// All mutating operations are atomic with respect to concurrent callers
/// for the same user.
#[async_trait]
pub trait BalanceLedger: Send + Sync {
    /// Create the balance row for a newly registered user
    ///
    /// Returns the existing row unchanged if the user already has one.
    async fn open_account(&self, user_id: &str) -> Result<Balance, LedgerError>;

    /// Current balance of a user (zero if the user has no row yet)
    async fn read_balance(&self, user_id: &str) -> Result<Balance, LedgerError>;

    /// Add a non-negative amount to the available balance
    async fn increment_available(&self, user_id: &str, amount: Decimal) -> Result<(), LedgerError>;

    /// Credit the accrual of an order, at most once per order identifier
    ///
    /// Returns `false` without touching the balance if the order was
    /// already credited.
    async fn credit_accrual(
        &self,
        user_id: &str,
        order_id: &str,
        amount: Decimal,
    ) -> Result<bool, LedgerError>;

    /// Move `amount` from available to withdrawn
    ///
    /// Fails with `InsufficientFunds` and applies no change if the
    /// available balance does not cover it.
    async fn increment_withdrawn(
        &self,
        user_id: &str,
        order_id: &str,
        amount: Decimal,
    ) -> Result<Withdrawal, LedgerError>;

    /// Withdrawals of a user in the order they were applied
    async fn withdrawals(&self, user_id: &str) -> Result<Vec<Withdrawal>, LedgerError>;

    /// Every balance row
    async fn balances(&self) -> Result<Vec<Balance>, LedgerError>;
}

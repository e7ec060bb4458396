//! Thread-safe in-memory balance ledger
//!
//! This module provides the `InMemoryBalanceLedger` struct, which manages
//! per-user balances using a `DashMap` keyed by user identifier.
//!
//! # Design
//!
//! Each user's balance, the set of orders already credited to it, and its
//! withdrawal history live in one map entry. Every mutation runs inside a
//! closure holding that entry's lock, so check-and-apply sequences (the
//! insufficient-funds check of a withdrawal, the already-credited check of
//! an accrual) are atomic with respect to concurrent callers for the same
//! user, while different users proceed in parallel.

use super::BalanceLedger;
use crate::types::{Balance, LedgerError, OrderId, UserId, Withdrawal};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::collections::HashSet;

/// Everything the ledger tracks for one user
#[derive(Debug, Clone)]
struct LedgerAccount {
    balance: Balance,

    /// Orders whose accrual has been credited
    credited: HashSet<OrderId>,

    withdrawals: Vec<Withdrawal>,
}

impl LedgerAccount {
    fn new(user_id: &str) -> Self {
        LedgerAccount {
            balance: Balance::new(user_id),
            credited: HashSet::new(),
            withdrawals: Vec::new(),
        }
    }

    fn credit(&mut self, amount: Decimal) -> Result<(), LedgerError> {
        self.balance.available = self
            .balance
            .available
            .checked_add(amount)
            .ok_or_else(|| LedgerError::arithmetic_overflow("credit", &self.balance.user_id))?;
        Ok(())
    }
}

/// Thread-safe balance ledger backed by `DashMap`
///
/// Operations on the same user are serialized by the map entry lock;
/// operations on different users don't block each other.
#[derive(Debug, Default)]
pub struct InMemoryBalanceLedger {
    accounts: DashMap<UserId, LedgerAccount>,
}

impl InMemoryBalanceLedger {
    pub fn new() -> Self {
        Self {
            accounts: DashMap::new(),
        }
    }

    /// Update a user's ledger entry using a closure, creating it if missing
    ///
    /// The closure runs while holding the entry lock.
    fn update<F, T>(&self, user_id: &str, f: F) -> Result<T, LedgerError>
    where
        F: FnOnce(&mut LedgerAccount) -> Result<T, LedgerError>,
    {
        let mut entry = self
            .accounts
            .entry(user_id.to_string())
            .or_insert_with(|| LedgerAccount::new(user_id));
        f(entry.value_mut())
    }
}

fn ensure_non_negative(amount: Decimal, operation: &str) -> Result<(), LedgerError> {
    if amount < Decimal::ZERO {
        return Err(LedgerError::invalid_amount(amount, operation));
    }
    Ok(())
}

#[async_trait]
impl BalanceLedger for InMemoryBalanceLedger {
    async fn open_account(&self, user_id: &str) -> Result<Balance, LedgerError> {
        self.update(user_id, |account| Ok(account.balance.clone()))
    }

    async fn read_balance(&self, user_id: &str) -> Result<Balance, LedgerError> {
        Ok(self
            .accounts
            .get(user_id)
            .map(|account| account.balance.clone())
            .unwrap_or_else(|| Balance::new(user_id)))
    }

    async fn increment_available(&self, user_id: &str, amount: Decimal) -> Result<(), LedgerError> {
        ensure_non_negative(amount, "increment_available")?;
        self.update(user_id, |account| account.credit(amount))
    }

    async fn credit_accrual(
        &self,
        user_id: &str,
        order_id: &str,
        amount: Decimal,
    ) -> Result<bool, LedgerError> {
        ensure_non_negative(amount, "credit_accrual")?;
        self.update(user_id, |account| {
            if account.credited.contains(order_id) {
                return Ok(false);
            }
            account.credit(amount)?;
            account.credited.insert(order_id.to_string());
            Ok(true)
        })
    }

    async fn increment_withdrawn(
        &self,
        user_id: &str,
        order_id: &str,
        amount: Decimal,
    ) -> Result<Withdrawal, LedgerError> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::invalid_amount(amount, "withdrawal"));
        }

        // A user without a row has nothing to withdraw; don't create one.
        let Some(mut account) = self.accounts.get_mut(user_id) else {
            return Err(LedgerError::insufficient_funds(user_id, Decimal::ZERO, amount));
        };

        let balance = &mut account.balance;
        if balance.available < amount {
            return Err(LedgerError::insufficient_funds(
                user_id,
                balance.available,
                amount,
            ));
        }

        let withdrawn = balance
            .withdrawn
            .checked_add(amount)
            .ok_or_else(|| LedgerError::arithmetic_overflow("withdrawal", user_id))?;
        balance.available -= amount;
        balance.withdrawn = withdrawn;

        let withdrawal = Withdrawal {
            order: order_id.to_string(),
            sum: amount,
            processed_at: Utc::now(),
        };
        account.withdrawals.push(withdrawal.clone());
        Ok(withdrawal)
    }

    async fn withdrawals(&self, user_id: &str) -> Result<Vec<Withdrawal>, LedgerError> {
        Ok(self
            .accounts
            .get(user_id)
            .map(|account| account.withdrawals.clone())
            .unwrap_or_default())
    }

    async fn balances(&self) -> Result<Vec<Balance>, LedgerError> {
        Ok(self
            .accounts
            .iter()
            .map(|entry| entry.value().balance.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn points(value: i64) -> Decimal {
        Decimal::new(value, 0)
    }

    #[tokio::test]
    async fn test_read_balance_for_unknown_user_is_zero() {
        let ledger = InMemoryBalanceLedger::new();

        let balance = ledger.read_balance("u1").await.unwrap();

        assert_eq!(balance, Balance::new("u1"));
        assert!(ledger.balances().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_open_account_is_idempotent() {
        let ledger = InMemoryBalanceLedger::new();
        ledger.increment_available("u1", points(10)).await.unwrap();

        let balance = ledger.open_account("u1").await.unwrap();

        assert_eq!(balance.available, points(10));
        assert_eq!(ledger.balances().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_increment_available_rejects_negative() {
        let ledger = InMemoryBalanceLedger::new();

        let result = ledger.increment_available("u1", points(-5)).await;

        assert!(matches!(result, Err(LedgerError::InvalidAmount { .. })));
        assert_eq!(ledger.read_balance("u1").await.unwrap().available, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_credit_accrual_once_per_order() {
        let ledger = InMemoryBalanceLedger::new();

        assert!(ledger.credit_accrual("u1", "A1", points(500)).await.unwrap());
        assert!(!ledger.credit_accrual("u1", "A1", points(500)).await.unwrap());
        assert!(ledger.credit_accrual("u1", "A4", points(20)).await.unwrap());

        let balance = ledger.read_balance("u1").await.unwrap();
        assert_eq!(balance.available, points(520));
    }

    #[tokio::test]
    async fn test_withdraw_moves_available_to_withdrawn() {
        let ledger = InMemoryBalanceLedger::new();
        ledger.increment_available("u1", points(700)).await.unwrap();

        let withdrawal = ledger
            .increment_withdrawn("u1", "2377225624", Decimal::new(75125, 2))
            .await;
        assert!(withdrawal.is_err());

        let withdrawal = ledger
            .increment_withdrawn("u1", "2377225624", points(200))
            .await
            .unwrap();
        assert_eq!(withdrawal.order, "2377225624");
        assert_eq!(withdrawal.sum, points(200));

        let balance = ledger.read_balance("u1").await.unwrap();
        assert_eq!(balance.available, points(500));
        assert_eq!(balance.withdrawn, points(200));
        assert_eq!(ledger.withdrawals("u1").await.unwrap(), vec![withdrawal]);
    }

    #[tokio::test]
    async fn test_failed_withdrawal_leaves_balance_unchanged() {
        let ledger = InMemoryBalanceLedger::new();
        ledger.increment_available("u1", points(100)).await.unwrap();
        let before = ledger.read_balance("u1").await.unwrap();

        let result = ledger.increment_withdrawn("u1", "W1", points(101)).await;

        assert_eq!(
            result.unwrap_err(),
            LedgerError::insufficient_funds("u1", points(100), points(101))
        );
        assert_eq!(ledger.read_balance("u1").await.unwrap(), before);
        assert!(ledger.withdrawals("u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_withdraw_without_account_does_not_create_one() {
        let ledger = InMemoryBalanceLedger::new();

        let result = ledger.increment_withdrawn("ghost", "W1", points(1)).await;

        assert!(matches!(result, Err(LedgerError::InsufficientFunds { .. })));
        assert!(ledger.balances().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_withdraw_rejects_non_positive_amount() {
        let ledger = InMemoryBalanceLedger::new();
        ledger.increment_available("u1", points(10)).await.unwrap();

        assert!(matches!(
            ledger.increment_withdrawn("u1", "W1", Decimal::ZERO).await,
            Err(LedgerError::InvalidAmount { .. })
        ));
        assert!(matches!(
            ledger.increment_withdrawn("u1", "W1", points(-1)).await,
            Err(LedgerError::InvalidAmount { .. })
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_withdrawals_never_overdraw() {
        let ledger = Arc::new(InMemoryBalanceLedger::new());
        ledger.increment_available("u1", points(1000)).await.unwrap();

        // 50 withdrawals of 30 against 1000: exactly 33 can succeed
        let mut handles = vec![];
        for i in 0..50 {
            let ledger = Arc::clone(&ledger);
            handles.push(tokio::spawn(async move {
                ledger
                    .increment_withdrawn("u1", &format!("W{}", i), points(30))
                    .await
            }));
        }

        let mut succeeded = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => succeeded += 1,
                Err(e) => assert!(matches!(e, LedgerError::InsufficientFunds { .. })),
            }
        }

        let balance = ledger.read_balance("u1").await.unwrap();
        assert_eq!(succeeded, 33);
        assert_eq!(balance.available, points(10));
        assert_eq!(balance.withdrawn, points(990));
        assert!(balance.available >= Decimal::ZERO);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_credits_same_order_apply_once() {
        let ledger = Arc::new(InMemoryBalanceLedger::new());

        let mut handles = vec![];
        for _ in 0..20 {
            let ledger = Arc::clone(&ledger);
            handles.push(tokio::spawn(async move {
                ledger.credit_accrual("u1", "A1", points(500)).await.unwrap()
            }));
        }

        let mut applied = 0;
        for handle in handles {
            if handle.await.unwrap() {
                applied += 1;
            }
        }

        assert_eq!(applied, 1);
        assert_eq!(ledger.read_balance("u1").await.unwrap().available, points(500));
    }
}

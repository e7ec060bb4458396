//! Thread-safe in-memory order store
//!
//! This module provides the `InMemoryOrderStore` struct, which keeps order
//! records in a `DashMap` keyed by order identifier.
//!
//! # Design
//!
//! A commit lock makes every operation a transaction. Writers
//! (`create_order`, `update_orders`) hold it exclusively, so the existence
//! check of a create and the validate-then-apply sequence of a batch update
//! are atomic. Readers hold it shared: they never block each other and never
//! see a batch half-applied.
//!
//! # Thread Safety
//!
//! All methods are safe to call concurrently from many reconciliation tasks.
//! Map references are never held while inserting into the same map.

use super::{OrderPredicate, OrderStore};
use crate::types::{LedgerError, Order, OrderId, OrderStatus};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Thread-safe order store backed by `DashMap`
#[derive(Debug, Default)]
pub struct InMemoryOrderStore {
    /// Order records by identifier
    orders: DashMap<OrderId, Order>,

    /// Exclusive for writers, shared for readers
    commit: RwLock<()>,
}

impl InMemoryOrderStore {
    /// Create a new empty InMemoryOrderStore
    pub fn new() -> Self {
        Self {
            orders: DashMap::new(),
            commit: RwLock::new(()),
        }
    }

    /// Create a store pre-populated with orders restored from a snapshot
    ///
    /// Later duplicates of the same identifier are rejected.
    pub fn with_orders(orders: impl IntoIterator<Item = Order>) -> Result<Self, LedgerError> {
        let store = Self::new();
        for order in orders {
            store.insert_new(order)?;
        }
        Ok(store)
    }

    /// Number of stored orders
    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    fn begin(&self) -> Result<RwLockWriteGuard<'_, ()>, LedgerError> {
        self.commit
            .write()
            .map_err(|_| LedgerError::storage("order store commit lock poisoned"))
    }

    fn snapshot(&self) -> Result<RwLockReadGuard<'_, ()>, LedgerError> {
        self.commit
            .read()
            .map_err(|_| LedgerError::storage("order store commit lock poisoned"))
    }

    fn insert_new(&self, order: Order) -> Result<(), LedgerError> {
        let _tx = self.begin()?;

        if let Some(existing) = self.orders.get(&order.id) {
            return Err(LedgerError::duplicate_order(
                &order.id,
                existing.user_id == order.user_id,
            ));
        }

        self.orders.insert(order.id.clone(), order);
        Ok(())
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn create_order(&self, order: Order) -> Result<(), LedgerError> {
        self.insert_new(order)
    }

    async fn read_orders(&self, predicate: &OrderPredicate) -> Result<Vec<Order>, LedgerError> {
        let mut orders: Vec<Order> = {
            let _tx = self.snapshot()?;
            self.orders
                .iter()
                .filter(|entry| predicate.matches(entry.value()))
                .map(|entry| entry.value().clone())
                .collect()
        };

        orders.sort_by(|a, b| {
            a.uploaded_at
                .cmp(&b.uploaded_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(orders)
    }

    async fn update_orders(&self, orders: &[Order]) -> Result<(), LedgerError> {
        let _tx = self.begin()?;

        // Validate the whole batch first; statuses staged earlier in the
        // batch count for later updates of the same order.
        let mut staged: HashMap<&str, OrderStatus> = HashMap::new();
        for update in orders {
            let current = match staged.get(update.id.as_str()) {
                Some(status) => *status,
                None => self
                    .orders
                    .get(&update.id)
                    .map(|existing| existing.status)
                    .ok_or_else(|| LedgerError::order_not_found(&update.id))?,
            };

            if !current.can_transition_to(update.status) {
                return Err(LedgerError::illegal_transition(
                    &update.id,
                    current,
                    update.status,
                ));
            }
            staged.insert(update.id.as_str(), update.status);
        }

        for update in orders {
            if let Some(mut existing) = self.orders.get_mut(&update.id) {
                existing.status = update.status;
                existing.accrual = update.accrual;
                existing.updated_at = update.updated_at;
            }
        }

        Ok(())
    }
}

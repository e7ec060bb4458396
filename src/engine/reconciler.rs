//! Order reconciliation orchestration
//!
//! This module provides the `ReconciliationEngine` struct, which accepts new
//! orders, rediscovers unfinished ones at startup and drives each of them
//! through the oracle until it reaches a terminal status.
//!
//! # Design
//!
//! One reconciliation task per order. A run of the task performs a single
//! oracle query, asks [`decide`] what it means, applies the resulting writes
//! and hands the task back to the pool as done, retried or throttled. The
//! task never sleeps while holding a pool slot.
//!
//! Writes are ordered credit first, persist second. The credit is keyed by
//! order identifier, so replaying it after a failed persist (or after a
//! crash and startup recovery) credits nothing twice.
//!
//! # Thread Safety
//!
//! The engine is cloneable; clones share the stores, the oracle and the
//! pool. It keeps no mutable state of its own: per-order exclusivity comes
//! from the pool's tracked keys and everything else from the stores.

use super::pool::{Task, WorkerPool, Yield, MAX_DELAY};
use super::transition::{decide, NextStep};
use super::EngineConfig;
use crate::oracle::AccrualOracle;
use crate::store::{BalanceLedger, OrderPredicate, OrderStore};
use crate::types::{LedgerError, Order};
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// Transient state of one order's reconciliation
#[derive(Debug, Clone)]
struct ReconciliationTask {
    /// Last persisted copy of the order
    order: Order,

    /// Oracle queries made so far by this process
    polls: u32,
}

impl ReconciliationTask {
    fn new(order: Order) -> Self {
        Self { order, polls: 0 }
    }
}

/// Order reconciliation engine
///
/// `ReconciliationEngine` coordinates the order store, the balance ledger
/// and the accrual oracle, scheduling its work on an injected `WorkerPool`.
#[derive(Clone)]
pub struct ReconciliationEngine {
    orders: Arc<dyn OrderStore>,
    ledger: Arc<dyn BalanceLedger>,
    oracle: Arc<dyn AccrualOracle>,
    pool: WorkerPool,
    config: EngineConfig,
}

impl ReconciliationEngine {
    /// Create a new ReconciliationEngine
    ///
    /// # Arguments
    ///
    /// * `orders` - Order persistence, also the reconciliation work queue
    /// * `ledger` - Balance ledger credited on `PROCESSED`
    /// * `oracle` - Source of order scores
    /// * `pool` - Scheduler running the reconciliation tasks
    /// * `config` - Retry delay, write timeout and startup stagger
    pub fn new(
        orders: Arc<dyn OrderStore>,
        ledger: Arc<dyn BalanceLedger>,
        oracle: Arc<dyn AccrualOracle>,
        pool: WorkerPool,
        config: EngineConfig,
    ) -> Self {
        Self {
            orders,
            ledger,
            oracle,
            pool,
            config,
        }
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Accept a new order and start reconciling it
    ///
    /// # Arguments
    ///
    /// * `order_id` - Externally assigned order number
    /// * `user_id` - User submitting the order
    ///
    /// # Returns
    ///
    /// * `Ok(order)` - The order as persisted, in status `NEW`
    /// * `Err(LedgerError::DuplicateOrder)` - The identifier already exists;
    ///   the existing order and its task are left alone
    /// * `Err(LedgerError::StorageError | StorageTimeout)` - The create failed,
    ///   or did not confirm in time; a create that committed late is picked
    ///   up when the same user submits the order again
    pub async fn submit(&self, order_id: &str, user_id: &str) -> Result<Order, LedgerError> {
        let order = Order::new(order_id, user_id, Utc::now());
        match self
            .write("create_order", self.orders.create_order(order.clone()))
            .await
        {
            Ok(()) => {}
            Err(e @ LedgerError::DuplicateOrder { same_user: true, .. }) => {
                self.adopt(order_id).await;
                return Err(e);
            }
            Err(e) => return Err(e),
        }

        info!(order = order_id, user = user_id, "order accepted");
        self.follow(order.clone());
        Ok(order)
    }

    /// Schedule reconciliation of an already persisted order
    ///
    /// Returns `false` if the order is terminal or already has a task.
    pub fn follow(&self, order: Order) -> bool {
        if order.is_terminal() {
            return false;
        }
        self.pool.submit(self.task(ReconciliationTask::new(order)))
    }

    /// Follow a stored order that has no task, e.g. after a timed-out create
    async fn adopt(&self, order_id: &str) {
        let stored = match self
            .orders
            .read_orders(&OrderPredicate::with_id(order_id))
            .await
        {
            Ok(mut found) if !found.is_empty() => found.remove(0),
            Ok(_) => return,
            Err(e) => {
                warn!(order = order_id, error = %e, "cannot read resubmitted order");
                return;
            }
        };
        if self.follow(stored) {
            warn!(order = order_id, "resubmitted order had no task, following it");
        }
    }

    /// Re-enqueue every non-terminal order found in the store
    ///
    /// Orders are spaced `startup_stagger` apart, oldest upload first.
    /// Orders that already have a task are skipped.
    ///
    /// # Returns
    ///
    /// The number of orders re-enqueued.
    pub async fn recover(&self) -> Result<usize, LedgerError> {
        let pending = self
            .orders
            .read_orders(&OrderPredicate::non_terminal())
            .await?;

        let mut resumed = 0;
        for order in pending {
            let steps = u32::try_from(resumed).unwrap_or(u32::MAX);
            let delay = self.config.startup_stagger.saturating_mul(steps).min(MAX_DELAY);
            if self
                .pool
                .submit_after(self.task(ReconciliationTask::new(order)), delay)
            {
                resumed += 1;
            }
        }

        info!(resumed, "startup recovery re-enqueued pending orders");
        Ok(resumed)
    }

    /// Wait until every scheduled order has reached a terminal status
    pub async fn drain(&self) {
        self.pool.drain().await
    }

    /// Stop reconciling; unfinished orders are picked up by the next `recover`
    pub async fn shutdown(&self) {
        self.pool.shutdown().await
    }

    fn task(&self, state: ReconciliationTask) -> Task {
        let engine = self.clone();
        Task::new(state.order.id.clone(), move || engine.reconcile(state))
    }

    /// One poll of one order
    async fn reconcile(self, mut task: ReconciliationTask) -> Yield {
        task.polls += 1;
        let order_id = task.order.id.clone();

        let outcome = self.oracle.query(&order_id).await;
        let transition = decide(task.order.status, &outcome);
        debug!(
            order = %order_id,
            polls = task.polls,
            status = %task.order.status,
            outcome = ?outcome,
            "oracle polled"
        );

        if let Some(amount) = transition.credit {
            let credit = self
                .ledger
                .credit_accrual(&task.order.user_id, &order_id, amount);
            match self.write("credit_accrual", credit).await {
                Ok(true) => info!(
                    order = %order_id,
                    user = %task.order.user_id,
                    %amount,
                    "accrual credited"
                ),
                Ok(false) => warn!(order = %order_id, "accrual already credited, not crediting again"),
                Err(e) => return self.write_failed(task, "credit_accrual", e),
            }
        }

        if let Some(state) = transition.persist {
            let updated = task.order.advanced(state.status, state.accrual, Utc::now());
            let update = self.orders.update_orders(std::slice::from_ref(&updated));
            match self.write("update_orders", update).await {
                Ok(()) => {
                    info!(
                        order = %order_id,
                        from = %task.order.status,
                        to = %updated.status,
                        accrual = %updated.accrual,
                        "order status updated"
                    );
                    task.order = updated;
                }
                Err(e) => return self.write_failed(task, "update_orders", e),
            }
        }

        match transition.next {
            NextStep::Complete => {
                debug!(order = %order_id, polls = task.polls, "reconciliation finished");
                Yield::Done
            }
            NextStep::Retry => self.retry(task),
            NextStep::Throttle(pause) => {
                warn!(
                    order = %order_id,
                    pause_ms = pause.as_millis() as u64,
                    "oracle rate limit hit, pausing all queries"
                );
                Yield::Throttle {
                    pause,
                    task: self.task(task),
                }
            }
        }
    }

    fn retry(&self, task: ReconciliationTask) -> Yield {
        Yield::Retry {
            delay: self.config.retry_delay,
            task: self.task(task),
        }
    }

    /// Infrastructure failures are retried on the next poll; anything else
    /// means the stored order no longer accepts this task's writes.
    fn write_failed(&self, task: ReconciliationTask, operation: &str, e: LedgerError) -> Yield {
        if e.is_retryable() {
            warn!(order = %task.order.id, operation, error = %e, "write failed, will retry");
            return self.retry(task);
        }

        error!(order = %task.order.id, operation, error = %e, "write rejected, dropping task");
        Yield::Done
    }

    /// Run a store or ledger write under the configured deadline
    async fn write<T>(
        &self,
        operation: &str,
        write: impl Future<Output = Result<T, LedgerError>>,
    ) -> Result<T, LedgerError> {
        match timeout(self.config.write_timeout, write).await {
            Ok(result) => result,
            Err(_) => Err(LedgerError::storage_timeout(
                operation,
                self.config.write_timeout,
            )),
        }
    }
}

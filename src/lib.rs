//! Loyalty Order Reconciler Library
//! # Overview
//!
//! This library reconciles loyalty-program orders against an external accrual
//! system: every accepted order is polled until the accrual system settles it,
//! and settled points are credited to the order owner's balance exactly once.
//!
//! # Architecture
//!
//! The system is organized into several key components:
//!
//! - [`types`] - Core data types (Order, Balance, LedgerError, etc.)
//! - [`store`] - Storage contracts and their in-memory implementations:
//!   - [`store::OrderStore`] - Order persistence and the reconciliation work queue
//!   - [`store::BalanceLedger`] - Per-user balances and idempotent accrual credits
//! - [`oracle`] - The accrual system contract, its HTTP client and a scripted stand-in
//! - [`engine`] - Reconciliation orchestration:
//!   - [`engine::transition`] - Pure decision table for one oracle answer
//!   - [`engine::pool`] - Bounded scheduler with delayed retries and a pause gate
//!   - [`engine::reconciler`] - Tasks binding stores, oracle and scheduler
//! - [`io`] - Submission parsing, order snapshots and the balance report
//! - [`cli`] - CLI argument parsing and log setup
//! - [`runner`] - One batch run of the binary
//!
//! # Order Lifecycle
//!
//! ```text
//! NEW ──→ PROCESSING ──→ PROCESSED (accrual credited)
//!  │           │
//!  └───────────┴──────→ INVALID
//! ```
//!
//! Statuses only move forward. `PROCESSED` and `INVALID` are terminal; an
//! order that is not terminal always has a reconciliation task, including
//! after a restart.
//!
//! # Balances
//!
//! Each balance maintains:
//! - `available`: Points credited from processed orders, minus withdrawals
//! - `withdrawn`: Total points spent

pub mod cli;
pub mod engine;
pub mod io;
pub mod oracle;
pub mod runner;
pub mod store;
pub mod types;

pub use engine::{EngineConfig, ReconciliationEngine, WorkerPool};
pub use io::write_balances_csv;
pub use oracle::{AccrualOracle, HttpAccrualClient, OracleOutcome, OracleStatus, ScriptedOracle};
pub use runner::Runner;
pub use store::{BalanceLedger, InMemoryBalanceLedger, InMemoryOrderStore, OrderStore};
pub use types::{Balance, LedgerError, Order, OrderId, OrderStatus, UserId, Withdrawal};

//! Order reconciliation engine
//!
//! This module drives every accepted order through the accrual oracle until
//! it reaches a terminal status.
//!
//! # Architecture
//!
//! ```text
//! ReconciliationEngine
//!     ├── Arc<dyn OrderStore>      (durable order records)
//!     ├── Arc<dyn BalanceLedger>   (per-user balances)
//!     ├── Arc<dyn AccrualOracle>   (external scorer)
//!     └── WorkerPool               (bounded scheduler)
//!             ├── DelayQueue       (suspended tasks waiting for their retry)
//!             ├── JoinSet          (running tasks, at most `workers`)
//!             └── pause gate       (pool-wide rate-limit pause)
//! ```
//!
//! - [`transition`] holds the pure decision table
//! - [`pool`] holds the scheduler, unaware of orders
//! - [`reconciler`] glues both to the stores and the oracle

pub mod pool;
pub mod reconciler;
pub mod transition;

pub use pool::{Task, WorkerPool, Yield, MAX_DELAY};
pub use reconciler::ReconciliationEngine;
pub use transition::{decide, NextStep, PersistedState, Transition};

use std::time::Duration;
use tracing::warn;

/// Tunables of the reconciliation engine
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    /// Maximum number of reconciliation tasks running at once
    pub workers: usize,

    /// Delay before re-polling an order whose status did not settle
    pub retry_delay: Duration,

    /// Upper bound on every store or ledger write
    pub write_timeout: Duration,

    /// Spacing between orders re-enqueued at startup
    pub startup_stagger: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: 50,
            retry_delay: Duration::from_millis(300),
            write_timeout: Duration::from_millis(200),
            startup_stagger: Duration::from_millis(200),
        }
    }
}

impl EngineConfig {
    /// Create a new EngineConfig with custom values
    ///
    /// Zero `workers`, `retry_delay` or `write_timeout` fall back to the
    /// default with a warning. A zero `startup_stagger` re-enqueues every
    /// pending order at once. Durations above [`MAX_DELAY`] are clamped.
    pub fn new(
        workers: usize,
        retry_delay: Duration,
        write_timeout: Duration,
        startup_stagger: Duration,
    ) -> Self {
        let default = Self::default();

        let workers = if workers == 0 {
            warn!(
                workers,
                fallback = default.workers,
                "invalid worker count, using default"
            );
            default.workers
        } else {
            workers
        };

        let retry_delay = if retry_delay.is_zero() {
            warn!(
                fallback_ms = default.retry_delay.as_millis() as u64,
                "invalid retry delay, using default"
            );
            default.retry_delay
        } else {
            retry_delay
        };

        let write_timeout = if write_timeout.is_zero() {
            warn!(
                fallback_ms = default.write_timeout.as_millis() as u64,
                "invalid write timeout, using default"
            );
            default.write_timeout
        } else {
            write_timeout
        };

        Self {
            workers,
            retry_delay: clamped("retry_delay", retry_delay),
            write_timeout: clamped("write_timeout", write_timeout),
            startup_stagger: clamped("startup_stagger", startup_stagger),
        }
    }
}

fn clamped(name: &str, value: Duration) -> Duration {
    if value > MAX_DELAY {
        warn!(
            setting = name,
            max_ms = MAX_DELAY.as_millis() as u64,
            "duration too long, clamping"
        );
        return MAX_DELAY;
    }
    value
}

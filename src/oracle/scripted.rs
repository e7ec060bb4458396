//! In-process oracle replaying canned outcomes
//!
//! Each order has a queue of outcomes returned one per query; once the
//! queue is empty the fallback outcome is returned. Every query is logged
//! with its (tokio) timestamp so callers can check pacing.

use super::{AccrualOracle, OracleOutcome};
use crate::types::OrderId;
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug)]
pub struct ScriptedOracle {
    scripts: DashMap<OrderId, VecDeque<OracleOutcome>>,
    fallback: OracleOutcome,
    log: Mutex<Vec<(OrderId, Instant)>>,
}

impl Default for ScriptedOracle {
    fn default() -> Self {
        Self::with_fallback(OracleOutcome::Unknown)
    }
}

impl ScriptedOracle {
    /// Oracle answering `Unknown` for anything unscripted
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fallback(fallback: OracleOutcome) -> Self {
        Self {
            scripts: DashMap::new(),
            fallback,
            log: Mutex::new(Vec::new()),
        }
    }

    /// Append outcomes to the queue of `order_id`
    pub fn script(&self, order_id: &str, outcomes: impl IntoIterator<Item = OracleOutcome>) {
        self.scripts
            .entry(order_id.to_string())
            .or_default()
            .extend(outcomes);
    }

    /// Number of queries received for `order_id`
    pub fn queries(&self, order_id: &str) -> usize {
        self.query_log()
            .iter()
            .filter(|(id, _)| id == order_id)
            .count()
    }

    /// Every query received so far, oldest first
    pub fn query_log(&self) -> Vec<(OrderId, Instant)> {
        self.log.lock().map(|log| log.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl AccrualOracle for ScriptedOracle {
    async fn query(&self, order_id: &str) -> OracleOutcome {
        if let Ok(mut log) = self.log.lock() {
            log.push((order_id.to_string(), Instant::now()));
        }

        self.scripts
            .get_mut(order_id)
            .and_then(|mut script| script.pop_front())
            .unwrap_or_else(|| self.fallback.clone())
    }
}

//! Pure reconciliation decision table
//!
//! `decide` maps the persisted status of an order and one oracle outcome to
//! the side effects the engine must perform and what happens to the task
//! next. It performs no I/O and reads no clock, so every row of the table
//! can be tested directly.

use crate::oracle::{OracleOutcome, OracleStatus};
use crate::types::OrderStatus;
use rust_decimal::Decimal;
use std::time::Duration;

/// What the task does after its side effects are applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextStep {
    /// The order reached a terminal status; the task ends
    Complete,

    /// Poll again after the engine's fixed retry delay
    Retry,

    /// Pause the whole pool for the given duration, then poll again
    Throttle(Duration),
}

/// Status and accrual to write to the order store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistedState {
    pub status: OrderStatus,
    pub accrual: Decimal,
}

/// Outcome of one decision
///
/// Side effects are applied in field order: credit first, then persist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// Accrual to credit to the order's owner before persisting
    pub credit: Option<Decimal>,

    /// New order state to persist, if it changed
    pub persist: Option<PersistedState>,

    pub next: NextStep,
}

impl Transition {
    fn retry() -> Self {
        Transition {
            credit: None,
            persist: None,
            next: NextStep::Retry,
        }
    }
}

/// Decide how an order in `current` reacts to `outcome`
pub fn decide(current: OrderStatus, outcome: &OracleOutcome) -> Transition {
    if current.is_terminal() {
        return Transition {
            credit: None,
            persist: None,
            next: NextStep::Complete,
        };
    }

    match outcome {
        OracleOutcome::TransientFailure { .. } | OracleOutcome::Unknown => Transition::retry(),

        OracleOutcome::RateLimited { retry_after } => Transition {
            credit: None,
            persist: None,
            next: NextStep::Throttle(*retry_after),
        },

        OracleOutcome::Scored {
            status: OracleStatus::Processed,
            accrual,
        } => Transition {
            credit: (*accrual > Decimal::ZERO).then_some(*accrual),
            persist: Some(PersistedState {
                status: OrderStatus::Processed,
                accrual: *accrual,
            }),
            next: NextStep::Complete,
        },

        OracleOutcome::Scored {
            status: OracleStatus::Invalid,
            ..
        } => Transition {
            credit: None,
            persist: Some(PersistedState {
                status: OrderStatus::Invalid,
                accrual: Decimal::ZERO,
            }),
            next: NextStep::Complete,
        },

        OracleOutcome::Scored { status, .. } => {
            let target = status.persisted();
            if target == current {
                return Transition::retry();
            }
            Transition {
                credit: None,
                persist: Some(PersistedState {
                    status: target,
                    accrual: Decimal::ZERO,
                }),
                next: NextStep::Retry,
            }
        }
    }
}

//! Types module
//!
//! Contains core data structures used throughout the application.
//! This module organizes types into logical submodules:
//! - `order`: Order lifecycle types and identifiers
//! - `balance`: Per-user balance and withdrawal records
//! - `error`: Error types for the ledger and reconciliation engine

pub mod balance;
pub mod error;
pub mod order;

pub use balance::{Balance, Withdrawal};
pub use error::LedgerError;
pub use order::{Order, OrderId, OrderStatus, UserId};

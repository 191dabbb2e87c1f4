//! Expense-splitting backend: groups log shared expenses, the service works
//! out who owes whom and tracks the confirmation of payments.
//!
//! The settlement calculator lives in [`exchange`] and is a pure function of
//! the balances computed by [`balance`].
pub mod auth;
pub mod balance;
pub mod error;
pub mod exchange;
pub mod notify;
pub mod routes;
pub mod schemas;
pub mod settings;
pub mod settlement;
pub mod store;

pub use balance::{compute_balances, settle_group, Balance};
pub use error::{AppError, ValidationError};
pub use exchange::{minimize_transactions, Exchange};
pub use settlement::{SettlementError, SettlementRecord, SettlementStatus};

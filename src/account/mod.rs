//! Account module
//!
//! Monetary containers. An account never stores its balance; the balance is
//! always derived from the ledger (see [`crate::ledger`]).

pub mod models;

pub use models::{Account, AccountBalance, AccountKind, AccountStatus, BANK_EQUITY_ACCOUNT_NUMBER};

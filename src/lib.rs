//! Fjord Ledger - Transaction Processing Core
//!
//! Turns client transfer requests into balanced, auditable ledger movements,
//! exactly once, under retries and concurrent workers.
//!
//! # Modules
//!
//! - [`core_types`] - ID newtypes (TransactionId, AccountId)
//! - [`money`] - Exact-decimal amount parsing and formatting
//! - [`account`] - Accounts, kinds and lifecycle status
//! - [`ledger`] - Append-only ledger entries and the balance invariant
//! - [`store`] - Ledger Store traits, PostgreSQL and in-memory backends
//! - [`transfer`] - Idempotency Gateway, state machine, Claim-and-Execute Engine
//! - [`dispatch`] - At-least-once dispatch queue and worker
//! - [`bootstrap`] - System account provisioning
//! - [`db`] - Connection pool and schema

// Core types - must be first!
pub mod core_types;

pub mod account;
pub mod bootstrap;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod ledger;
pub mod logging;
pub mod money;
pub mod store;
pub mod transfer;

// Convenient re-exports at crate root
pub use account::{Account, AccountBalance, AccountKind, AccountStatus};
pub use core_types::{AccountId, EntryId, TransactionId};
pub use dispatch::{DispatchMessage, DispatchQueue, DispatchWorker};
pub use ledger::{EntryKind, LedgerEntry};
pub use store::{LedgerStore, MemoryLedgerStore, PgLedgerStore, UnitOfWork};
pub use transfer::{
    Admission, EngineConfig, ExecutionOutcome, IdempotencyGateway, TransactionStatus,
    TransferEngine, TransferError, TransferIntent, TransferReceipt, TransferService,
};

//! Transfer Processing
//!
//! Turns a transfer intent into a balanced, auditable pair of ledger
//! entries, exactly once.
//!
//! # Flow
//!
//! ```text
//! TransferIntent → IdempotencyGateway (PENDING record)
//!                → inline TransferEngine, or DispatchQueue → DispatchWorker → TransferEngine
//!                → COMPLETED | FAILED
//! ```
//!
//! The conditional claim `PENDING → PROCESSING` is the only coordination
//! between workers; see [`engine`].

pub mod engine;
pub mod error;
pub mod gateway;
pub mod recovery;
pub mod service;
pub mod state;
pub mod types;

pub use engine::{EngineConfig, ExecutionOutcome, TransferEngine};
pub use error::TransferError;
pub use gateway::{Admission, IdempotencyGateway};
pub use recovery::{RecoveryConfig, RecoveryWorker};
pub use service::TransferService;
pub use state::TransactionStatus;
pub use types::{
    PartyRole, TransactionDetail, TransactionKind, TransactionParty, TransactionRecord,
    TransferIntent, TransferReceipt,
};

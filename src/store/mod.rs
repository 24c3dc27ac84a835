//! Ledger Store
//!
//! The one shared, transactionally consistent store holding accounts,
//! transaction records, transaction parties and ledger entries.
//!
//! # Seams
//!
//! - [`LedgerStore`]: pool-level reads and the intake insert
//! - [`UnitOfWork`]: one atomic unit used by the engine. Dropping a unit
//!   without calling [`UnitOfWork::commit`] rolls it back.
//!
//! # Implementations
//!
//! - [`postgres::PgLedgerStore`]: PostgreSQL via sqlx (production)
//! - [`memory::MemoryLedgerStore`]: in-process, units serialized (tests, local runs)

pub mod memory;
pub mod postgres;

pub use memory::MemoryLedgerStore;
pub use postgres::PgLedgerStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::time::Duration;

use crate::account::{Account, AccountStatus};
use crate::core_types::{AccountId, TransactionId};
use crate::ledger::LedgerEntry;
use crate::transfer::error::TransferError;
use crate::transfer::types::{TransactionParty, TransactionRecord};

/// Default page size for account entry listings
pub const DEFAULT_ENTRY_LIMIT: i64 = 100;

/// Upper bound for account entry listings
pub const MAX_ENTRY_LIMIT: i64 = 1000;

/// Clamp a caller-supplied listing limit; out-of-range values fall back to the default
pub fn clamp_entry_limit(limit: i64) -> i64 {
    if limit <= 0 || limit > MAX_ENTRY_LIMIT {
        DEFAULT_ENTRY_LIMIT
    } else {
        limit
    }
}

/// Result of inserting a new transaction record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Created,
    /// The idempotency key's uniqueness constraint rejected the insert
    DuplicateKey,
}

/// Pool-level store operations
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Get backend name for logging
    fn name(&self) -> &'static str;

    /// Open an atomic unit of work
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, TransferError>;

    // === Accounts ===

    async fn insert_account(&self, account: &Account) -> Result<(), TransferError>;

    async fn get_account(&self, id: AccountId) -> Result<Option<Account>, TransferError>;

    async fn get_account_by_number(&self, number: &str) -> Result<Option<Account>, TransferError>;

    /// Returns false if the account does not exist
    async fn set_account_status(
        &self,
        id: AccountId,
        status: AccountStatus,
    ) -> Result<bool, TransferError>;

    // === Transactions ===

    /// Insert a PENDING record and its parties atomically.
    ///
    /// A uniqueness violation on the idempotency key is reported as
    /// [`InsertOutcome::DuplicateKey`], never as an error; nothing is written.
    async fn insert_transaction(
        &self,
        record: &TransactionRecord,
        parties: &[TransactionParty],
    ) -> Result<InsertOutcome, TransferError>;

    async fn get_transaction(
        &self,
        id: TransactionId,
    ) -> Result<Option<TransactionRecord>, TransferError>;

    async fn get_transaction_by_key(
        &self,
        idempotency_key: &str,
    ) -> Result<Option<TransactionRecord>, TransferError>;

    async fn get_parties(&self, id: TransactionId) -> Result<Vec<TransactionParty>, TransferError>;

    /// PENDING transactions initiated longer than `older_than` ago, oldest first
    async fn find_stale_pending(
        &self,
        older_than: Duration,
        limit: i64,
    ) -> Result<Vec<TransactionRecord>, TransferError>;

    // === Ledger ===

    /// Entries of one transaction, oldest first
    async fn entries_for_transaction(
        &self,
        id: TransactionId,
    ) -> Result<Vec<LedgerEntry>, TransferError>;

    /// Entries of one account, newest first
    async fn entries_for_account(
        &self,
        account_id: AccountId,
        limit: i64,
    ) -> Result<Vec<LedgerEntry>, TransferError>;

    /// Sum of entries with `created_at <= as_of`
    async fn balance_as_of(
        &self,
        account_id: AccountId,
        as_of: DateTime<Utc>,
    ) -> Result<Decimal, TransferError>;
}

/// One atomic unit of work.
///
/// Every write is invisible to other units until `commit`. Dropping the
/// unit (error path, timeout, crash) discards all of it, including the claim.
#[async_trait]
pub trait UnitOfWork: Send {
    /// Conditional `PENDING → PROCESSING` update.
    ///
    /// Returns the claimed record, or `None` if the row is missing or not PENDING.
    async fn claim(
        &mut self,
        id: TransactionId,
        at: DateTime<Utc>,
    ) -> Result<Option<TransactionRecord>, TransferError>;

    async fn parties(&mut self, id: TransactionId) -> Result<Vec<TransactionParty>, TransferError>;

    /// Read an account, taking an exclusive lock on it for the rest of the unit
    async fn lock_account(&mut self, id: AccountId) -> Result<Option<Account>, TransferError>;

    /// Read an account without locking
    async fn get_account(&mut self, id: AccountId) -> Result<Option<Account>, TransferError>;

    /// Current balance, consistent with this unit's own writes
    async fn balance(&mut self, account_id: AccountId) -> Result<Decimal, TransferError>;

    /// Append entries as one batch
    async fn insert_entries(&mut self, entries: &[LedgerEntry]) -> Result<(), TransferError>;

    /// Conditional `PROCESSING → COMPLETED`; false if the row was not PROCESSING
    async fn complete(&mut self, id: TransactionId, at: DateTime<Utc>)
    -> Result<bool, TransferError>;

    /// Conditional `PROCESSING → FAILED` with a reason; false if the row was not PROCESSING
    async fn fail(
        &mut self,
        id: TransactionId,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, TransferError>;

    async fn commit(self: Box<Self>) -> Result<(), TransferError>;

    async fn rollback(self: Box<Self>) -> Result<(), TransferError>;
}

//! In-memory Ledger Store
//!
//! Units of work are serialized: a unit holds the store lock from `begin`
//! until it is committed or dropped, and works on a staged copy of the state.
//! Commit swaps the copy in; drop discards it.
//!
//! The same checks the PostgreSQL schema enforces (unique idempotency key,
//! foreign keys, non-zero entries) are applied here so engine behavior under
//! test matches production.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{InsertOutcome, LedgerStore, UnitOfWork};
use crate::account::{Account, AccountStatus};
use crate::core_types::{AccountId, TransactionId};
use crate::ledger::LedgerEntry;
use crate::transfer::error::TransferError;
use crate::transfer::state::TransactionStatus;
use crate::transfer::types::{TransactionParty, TransactionRecord};

#[derive(Debug, Default, Clone)]
struct MemoryState {
    accounts: HashMap<AccountId, Account>,
    transactions: HashMap<TransactionId, TransactionRecord>,
    keys: HashMap<String, TransactionId>,
    parties: HashMap<TransactionId, Vec<TransactionParty>>,
    entries: Vec<LedgerEntry>,
}

impl MemoryState {
    fn balance(&self, account_id: AccountId, as_of: Option<DateTime<Utc>>) -> Decimal {
        self.entries
            .iter()
            .filter(|e| e.account_id == account_id)
            .filter(|e| as_of.is_none_or(|t| e.created_at <= t))
            .map(|e| e.amount)
            .sum()
    }
}

/// Fault injection for failure-path tests
#[derive(Debug, Default)]
struct Faults {
    fail_entry_writes: AtomicBool,
    entry_write_delay: StdMutex<Option<Duration>>,
}

/// In-memory ledger store
#[derive(Clone, Default)]
pub struct MemoryLedgerStore {
    state: Arc<Mutex<MemoryState>>,
    faults: Arc<Faults>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent entry write fail with a database error
    pub fn fail_entry_writes(&self, fail: bool) {
        self.faults.fail_entry_writes.store(fail, Ordering::SeqCst);
    }

    /// Stall entry writes, to exercise unit-of-work timeouts
    pub fn delay_entry_writes(&self, delay: Option<Duration>) {
        if let Ok(mut guard) = self.faults.entry_write_delay.lock() {
            *guard = delay;
        }
    }

    /// Number of committed ledger entries
    pub async fn entry_count(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    /// Number of committed transaction records
    pub async fn transaction_count(&self) -> usize {
        self.state.lock().await.transactions.len()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, TransferError> {
        let guard = self.state.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(MemoryUnitOfWork {
            guard,
            staged,
            faults: self.faults.clone(),
        }))
    }

    async fn insert_account(&self, account: &Account) -> Result<(), TransferError> {
        let mut state = self.state.lock().await;
        if state.accounts.contains_key(&account.id) {
            return Err(TransferError::DatabaseError(format!(
                "duplicate account id {}",
                account.id
            )));
        }
        if state
            .accounts
            .values()
            .any(|a| a.account_number == account.account_number)
        {
            return Err(TransferError::DatabaseError(format!(
                "duplicate account number {}",
                account.account_number
            )));
        }
        state.accounts.insert(account.id, account.clone());
        Ok(())
    }

    async fn get_account(&self, id: AccountId) -> Result<Option<Account>, TransferError> {
        Ok(self.state.lock().await.accounts.get(&id).cloned())
    }

    async fn get_account_by_number(&self, number: &str) -> Result<Option<Account>, TransferError> {
        let state = self.state.lock().await;
        Ok(state
            .accounts
            .values()
            .find(|a| a.account_number == number)
            .cloned())
    }

    async fn set_account_status(
        &self,
        id: AccountId,
        status: AccountStatus,
    ) -> Result<bool, TransferError> {
        let mut state = self.state.lock().await;
        match state.accounts.get_mut(&id) {
            Some(account) => {
                account.status = status;
                account.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn insert_transaction(
        &self,
        record: &TransactionRecord,
        parties: &[TransactionParty],
    ) -> Result<InsertOutcome, TransferError> {
        let mut state = self.state.lock().await;

        if state.keys.contains_key(&record.idempotency_key) {
            return Ok(InsertOutcome::DuplicateKey);
        }
        for account_id in [record.source_account_id, record.destination_account_id]
            .into_iter()
            .chain(parties.iter().map(|p| p.account_id))
        {
            if !state.accounts.contains_key(&account_id) {
                return Err(TransferError::DatabaseError(format!(
                    "foreign key violation: account {}",
                    account_id
                )));
            }
        }

        state
            .keys
            .insert(record.idempotency_key.clone(), record.id);
        state.transactions.insert(record.id, record.clone());
        state.parties.insert(record.id, parties.to_vec());
        Ok(InsertOutcome::Created)
    }

    async fn get_transaction(
        &self,
        id: TransactionId,
    ) -> Result<Option<TransactionRecord>, TransferError> {
        Ok(self.state.lock().await.transactions.get(&id).cloned())
    }

    async fn get_transaction_by_key(
        &self,
        idempotency_key: &str,
    ) -> Result<Option<TransactionRecord>, TransferError> {
        let state = self.state.lock().await;
        Ok(state
            .keys
            .get(idempotency_key)
            .and_then(|id| state.transactions.get(id))
            .cloned())
    }

    async fn get_parties(&self, id: TransactionId) -> Result<Vec<TransactionParty>, TransferError> {
        let state = self.state.lock().await;
        Ok(state.parties.get(&id).cloned().unwrap_or_default())
    }

    async fn find_stale_pending(
        &self,
        older_than: Duration,
        limit: i64,
    ) -> Result<Vec<TransactionRecord>, TransferError> {
        let older_than = chrono::Duration::from_std(older_than)
            .map_err(|e| TransferError::SystemError(e.to_string()))?;
        let cutoff = Utc::now() - older_than;

        let state = self.state.lock().await;
        let mut stale: Vec<TransactionRecord> = state
            .transactions
            .values()
            .filter(|r| r.status == TransactionStatus::Pending && r.initiated_at < cutoff)
            .cloned()
            .collect();
        stale.sort_by_key(|r| r.initiated_at);
        stale.truncate(limit.max(0) as usize);
        Ok(stale)
    }

    async fn entries_for_transaction(
        &self,
        id: TransactionId,
    ) -> Result<Vec<LedgerEntry>, TransferError> {
        let state = self.state.lock().await;
        let mut entries: Vec<LedgerEntry> = state
            .entries
            .iter()
            .filter(|e| e.transaction_id == id)
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.created_at);
        Ok(entries)
    }

    async fn entries_for_account(
        &self,
        account_id: AccountId,
        limit: i64,
    ) -> Result<Vec<LedgerEntry>, TransferError> {
        let state = self.state.lock().await;
        let mut entries: Vec<LedgerEntry> = state
            .entries
            .iter()
            .rev()
            .filter(|e| e.account_id == account_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        entries.truncate(limit.max(0) as usize);
        Ok(entries)
    }

    async fn balance_as_of(
        &self,
        account_id: AccountId,
        as_of: DateTime<Utc>,
    ) -> Result<Decimal, TransferError> {
        Ok(self.state.lock().await.balance(account_id, Some(as_of)))
    }
}

/// Staged unit of work over the in-memory state
pub struct MemoryUnitOfWork {
    guard: OwnedMutexGuard<MemoryState>,
    staged: MemoryState,
    faults: Arc<Faults>,
}

impl MemoryUnitOfWork {
    fn transition(
        &mut self,
        id: TransactionId,
        from: TransactionStatus,
        apply: impl FnOnce(&mut TransactionRecord),
    ) -> Option<TransactionRecord> {
        let record = self.staged.transactions.get_mut(&id)?;
        if record.status != from {
            return None;
        }
        apply(record);
        Some(record.clone())
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn claim(
        &mut self,
        id: TransactionId,
        at: DateTime<Utc>,
    ) -> Result<Option<TransactionRecord>, TransferError> {
        Ok(self.transition(id, TransactionStatus::Pending, |r| {
            r.status = TransactionStatus::Processing;
            r.processed_at = Some(at);
        }))
    }

    async fn parties(&mut self, id: TransactionId) -> Result<Vec<TransactionParty>, TransferError> {
        Ok(self.staged.parties.get(&id).cloned().unwrap_or_default())
    }

    async fn lock_account(&mut self, id: AccountId) -> Result<Option<Account>, TransferError> {
        // The whole store is already held by this unit.
        Ok(self.staged.accounts.get(&id).cloned())
    }

    async fn get_account(&mut self, id: AccountId) -> Result<Option<Account>, TransferError> {
        Ok(self.staged.accounts.get(&id).cloned())
    }

    async fn balance(&mut self, account_id: AccountId) -> Result<Decimal, TransferError> {
        Ok(self.staged.balance(account_id, None))
    }

    async fn insert_entries(&mut self, entries: &[LedgerEntry]) -> Result<(), TransferError> {
        let delay = self
            .faults
            .entry_write_delay
            .lock()
            .ok()
            .and_then(|guard| *guard);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.faults.fail_entry_writes.load(Ordering::SeqCst) {
            return Err(TransferError::DatabaseError(
                "injected ledger entry write failure".to_string(),
            ));
        }

        for entry in entries {
            if entry.amount.is_zero() {
                return Err(TransferError::DatabaseError(
                    "check constraint violation: zero ledger entry".to_string(),
                ));
            }
            if !self.staged.transactions.contains_key(&entry.transaction_id)
                || !self.staged.accounts.contains_key(&entry.account_id)
            {
                return Err(TransferError::DatabaseError(format!(
                    "foreign key violation: ledger entry {}",
                    entry.id
                )));
            }
        }
        self.staged.entries.extend_from_slice(entries);
        Ok(())
    }

    async fn complete(
        &mut self,
        id: TransactionId,
        at: DateTime<Utc>,
    ) -> Result<bool, TransferError> {
        Ok(self
            .transition(id, TransactionStatus::Processing, |r| {
                r.status = TransactionStatus::Completed;
                r.completed_at = Some(at);
            })
            .is_some())
    }

    async fn fail(
        &mut self,
        id: TransactionId,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, TransferError> {
        Ok(self
            .transition(id, TransactionStatus::Processing, |r| {
                r.status = TransactionStatus::Failed;
                r.completed_at = Some(at);
                r.error_message = Some(reason.to_string());
            })
            .is_some())
    }

    async fn commit(self: Box<Self>) -> Result<(), TransferError> {
        let MemoryUnitOfWork {
            mut guard, staged, ..
        } = *self;
        *guard = staged;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), TransferError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::AccountKind;
    use crate::ledger::build_transfer_entries;
    use rust_decimal_macros::dec;

    async fn store_with_accounts() -> (MemoryLedgerStore, Account, Account) {
        let store = MemoryLedgerStore::new();
        let a = Account::new(AccountKind::Checking, "NOK");
        let b = Account::new(AccountKind::Checking, "NOK");
        store.insert_account(&a).await.unwrap();
        store.insert_account(&b).await.unwrap();
        (store, a, b)
    }

    async fn pending(store: &MemoryLedgerStore, a: &Account, b: &Account) -> TransactionRecord {
        let record = TransactionRecord::pending(
            uuid::Uuid::new_v4().to_string(),
            a.id,
            b.id,
            dec!(10),
            "NOK",
            None,
        );
        store
            .insert_transaction(&record, &record.parties())
            .await
            .unwrap();
        record
    }

    #[tokio::test]
    async fn test_duplicate_key_writes_nothing() {
        let (store, a, b) = store_with_accounts().await;
        let first = TransactionRecord::pending("k", a.id, b.id, dec!(1), "NOK", None);
        let second = TransactionRecord::pending("k", a.id, b.id, dec!(2), "NOK", None);

        assert_eq!(
            store.insert_transaction(&first, &first.parties()).await.unwrap(),
            InsertOutcome::Created
        );
        assert_eq!(
            store.insert_transaction(&second, &second.parties()).await.unwrap(),
            InsertOutcome::DuplicateKey
        );
        assert_eq!(store.transaction_count().await, 1);
        assert!(store.get_parties(second.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_account_rejected() {
        let (store, a, _) = store_with_accounts().await;
        let record = TransactionRecord::pending("k", a.id, AccountId::new(), dec!(1), "NOK", None);
        let result = store.insert_transaction(&record, &record.parties()).await;
        assert!(matches!(result, Err(TransferError::DatabaseError(_))));
    }

    #[tokio::test]
    async fn test_dropped_unit_discards_claim_and_entries() {
        let (store, a, b) = store_with_accounts().await;
        let record = pending(&store, &a, &b).await;

        {
            let mut uow = store.begin().await.unwrap();
            assert!(uow.claim(record.id, Utc::now()).await.unwrap().is_some());
            let entries = build_transfer_entries(record.id, a.id, b.id, dec!(10), Utc::now());
            uow.insert_entries(&entries).await.unwrap();
        }

        let reloaded = store.get_transaction(record.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, TransactionStatus::Pending);
        assert_eq!(store.entry_count().await, 0);
    }

    #[tokio::test]
    async fn test_commit_publishes_writes() {
        let (store, a, b) = store_with_accounts().await;
        let record = pending(&store, &a, &b).await;

        let mut uow = store.begin().await.unwrap();
        uow.claim(record.id, Utc::now()).await.unwrap();
        let entries = build_transfer_entries(record.id, a.id, b.id, dec!(10), Utc::now());
        uow.insert_entries(&entries).await.unwrap();
        assert_eq!(uow.balance(b.id).await.unwrap(), dec!(10));
        assert!(uow.complete(record.id, Utc::now()).await.unwrap());
        uow.commit().await.unwrap();

        assert_eq!(store.entry_count().await, 2);
        let reloaded = store.get_transaction(record.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, TransactionStatus::Completed);
        assert!(reloaded.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_conditional_transitions() {
        let (store, a, b) = store_with_accounts().await;
        let record = pending(&store, &a, &b).await;

        let mut uow = store.begin().await.unwrap();
        // not yet claimed
        assert!(!uow.complete(record.id, Utc::now()).await.unwrap());
        assert!(uow.claim(record.id, Utc::now()).await.unwrap().is_some());
        assert!(uow.claim(record.id, Utc::now()).await.unwrap().is_none());
        assert!(uow.fail(record.id, "insufficient funds", Utc::now()).await.unwrap());
        assert!(!uow.complete(record.id, Utc::now()).await.unwrap());
        uow.commit().await.unwrap();

        let reloaded = store.get_transaction(record.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, TransactionStatus::Failed);
        assert_eq!(reloaded.error_message.as_deref(), Some("insufficient funds"));
    }

    #[tokio::test]
    async fn test_injected_entry_failure() {
        let (store, a, b) = store_with_accounts().await;
        let record = pending(&store, &a, &b).await;
        store.fail_entry_writes(true);

        let mut uow = store.begin().await.unwrap();
        uow.claim(record.id, Utc::now()).await.unwrap();
        let entries = build_transfer_entries(record.id, a.id, b.id, dec!(10), Utc::now());
        assert!(uow.insert_entries(&entries).await.is_err());
    }

    #[tokio::test]
    async fn test_balance_as_of() {
        let (store, a, b) = store_with_accounts().await;
        let record = pending(&store, &a, &b).await;
        let at = Utc::now();

        let mut uow = store.begin().await.unwrap();
        uow.claim(record.id, at).await.unwrap();
        let entries = build_transfer_entries(record.id, a.id, b.id, dec!(10), at);
        uow.insert_entries(&entries).await.unwrap();
        uow.complete(record.id, at).await.unwrap();
        uow.commit().await.unwrap();

        let before = at - chrono::Duration::seconds(1);
        assert_eq!(store.balance_as_of(b.id, before).await.unwrap(), Decimal::ZERO);
        assert_eq!(store.balance_as_of(b.id, at).await.unwrap(), dec!(10));
        assert_eq!(store.balance_as_of(a.id, at).await.unwrap(), dec!(-10));
    }
}

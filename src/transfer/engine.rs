//! Claim-and-Execute Engine
//!
//! Runs one transaction to a terminal state inside a single unit of work:
//!
//! ```text
//! claim → resolve parties → lock source → re-check accounts
//!       → funds check → write entries → complete → commit
//! ```
//!
//! A lost claim is a benign no-op. Business rule violations after the claim
//! are committed as FAILED with no entries. Anything else drops the unit,
//! which rolls back the claim and leaves the transaction PENDING.

use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::error::TransferError;
use super::state::TransactionStatus;
use super::types::resolve_parties;
use crate::core_types::TransactionId;
use crate::ledger::{build_transfer_entries, is_balanced};
use crate::store::{LedgerStore, UnitOfWork};

pub const REASON_INSUFFICIENT_FUNDS: &str = "insufficient funds";
pub const REASON_INVALID_PARTIES: &str = "invalid transaction parties";
pub const REASON_INVALID_AMOUNT: &str = "invalid amount";
pub const REASON_ACCOUNT_NOT_ACTIVE: &str = "account not active";

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Upper bound on one unit of work, from `begin` to `commit`
    pub unit_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            unit_timeout: Duration::from_secs(5),
        }
    }
}

/// Result of one execution attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// Entries written, transaction COMPLETED
    Completed,
    /// Business rule violated, transaction FAILED with `reason`
    Failed { reason: String },
    /// Claim not obtained: already claimed, terminal, or unknown id
    AlreadyHandled,
}

impl ExecutionOutcome {
    /// Status this attempt left the transaction in, if it moved it
    pub fn status(&self) -> Option<TransactionStatus> {
        match self {
            ExecutionOutcome::Completed => Some(TransactionStatus::Completed),
            ExecutionOutcome::Failed { .. } => Some(TransactionStatus::Failed),
            ExecutionOutcome::AlreadyHandled => None,
        }
    }
}

/// Claim-and-Execute Engine
pub struct TransferEngine {
    store: Arc<dyn LedgerStore>,
    config: EngineConfig,
}

impl TransferEngine {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self::with_config(store, EngineConfig::default())
    }

    pub fn with_config(store: Arc<dyn LedgerStore>, config: EngineConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Execute a transaction, bounded by `unit_timeout`.
    ///
    /// Safe to call any number of times for the same id; only the attempt
    /// that wins the claim does anything.
    pub async fn execute(&self, id: TransactionId) -> Result<ExecutionOutcome, TransferError> {
        match tokio::time::timeout(self.config.unit_timeout, self.run_unit(id)).await {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(e)) => {
                error!(transaction_id = %id, error = %e, "Unit of work aborted, rolled back");
                Err(e)
            }
            Err(_) => {
                let ms = self.config.unit_timeout.as_millis() as u64;
                warn!(transaction_id = %id, timeout_ms = ms, "Unit of work timed out, rolled back");
                Err(TransferError::Timeout(ms))
            }
        }
    }

    async fn run_unit(&self, id: TransactionId) -> Result<ExecutionOutcome, TransferError> {
        let mut uow = self.store.begin().await?;

        // Step 1: claim
        let Some(record) = uow.claim(id, Utc::now()).await? else {
            uow.rollback().await?;
            debug!(transaction_id = %id, "Claim not obtained, already handled");
            return Ok(ExecutionOutcome::AlreadyHandled);
        };

        if record.amount <= Decimal::ZERO {
            return self.fail(uow, id, REASON_INVALID_AMOUNT).await;
        }

        // Step 2: parties
        let parties = uow.parties(id).await?;
        let Some((source_id, destination_id)) = resolve_parties(&parties) else {
            return self.fail(uow, id, REASON_INVALID_PARTIES).await;
        };

        // Step 3: lock the source account for the rest of the unit, then read
        let Some(source) = uow.lock_account(source_id).await? else {
            return self.fail(uow, id, REASON_INVALID_PARTIES).await;
        };
        let Some(destination) = uow.get_account(destination_id).await? else {
            return self.fail(uow, id, REASON_INVALID_PARTIES).await;
        };
        if !source.is_active() || !destination.is_active() {
            return self.fail(uow, id, REASON_ACCOUNT_NOT_ACTIVE).await;
        }

        // Step 4: funds check. System accounts may go negative.
        if !source.is_system() {
            let balance = uow.balance(source_id).await?;
            if balance < record.amount {
                debug!(
                    transaction_id = %id,
                    balance = %balance,
                    amount = %record.amount,
                    "Insufficient funds"
                );
                return self.fail(uow, id, REASON_INSUFFICIENT_FUNDS).await;
            }
        }

        // Step 5-6: balanced entry pair, one batch
        let entries = build_transfer_entries(
            id,
            source_id,
            destination_id,
            record.amount,
            Utc::now(),
        );
        if !is_balanced(&entries) {
            return Err(TransferError::SystemError(format!(
                "unbalanced entries built for {}",
                id
            )));
        }
        uow.insert_entries(&entries).await?;

        // Step 7: complete
        if !uow.complete(id, Utc::now()).await? {
            return Err(TransferError::InvalidStateTransition(format!(
                "{} left processing before completion",
                id
            )));
        }

        // Step 8: commit
        uow.commit().await?;
        info!(
            transaction_id = %id,
            source = %source_id,
            destination = %destination_id,
            amount = %record.amount,
            currency = %record.currency,
            "Transfer completed"
        );
        Ok(ExecutionOutcome::Completed)
    }

    /// Record a business failure and commit it
    async fn fail(
        &self,
        mut uow: Box<dyn UnitOfWork>,
        id: TransactionId,
        reason: &str,
    ) -> Result<ExecutionOutcome, TransferError> {
        if !uow.fail(id, reason, Utc::now()).await? {
            return Err(TransferError::InvalidStateTransition(format!(
                "{} left processing before failure was recorded",
                id
            )));
        }
        uow.commit().await?;
        info!(transaction_id = %id, reason = reason, "Transfer failed");
        Ok(ExecutionOutcome::Failed {
            reason: reason.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::{Account, AccountKind, AccountStatus, BANK_EQUITY_ACCOUNT_NUMBER};
    use crate::core_types::AccountId;
    use crate::store::MemoryLedgerStore;
    use crate::transfer::gateway::IdempotencyGateway;
    use crate::transfer::types::TransferIntent;
    use rust_decimal_macros::dec;

    struct Harness {
        store: Arc<MemoryLedgerStore>,
        gateway: IdempotencyGateway,
        engine: TransferEngine,
        equity: Account,
    }

    impl Harness {
        async fn new(config: EngineConfig) -> Self {
            let store = Arc::new(MemoryLedgerStore::new());
            let equity = Account::with_number(
                AccountId::new(),
                BANK_EQUITY_ACCOUNT_NUMBER,
                AccountKind::Equity,
                "NOK",
            );
            store.insert_account(&equity).await.unwrap();
            Self {
                gateway: IdempotencyGateway::new(store.clone()),
                engine: TransferEngine::with_config(store.clone(), config),
                store,
                equity,
            }
        }

        async fn account(&self) -> Account {
            let account = Account::new(AccountKind::Checking, "NOK");
            self.store.insert_account(&account).await.unwrap();
            account
        }

        async fn submit(&self, from: AccountId, to: AccountId, amount: &str) -> TransactionId {
            let intent = TransferIntent::new(uuid::Uuid::new_v4().to_string(), from, to, amount, "NOK");
            self.gateway.admit(&intent).await.unwrap().into_record().id
        }

        async fn fund(&self, account: &Account, amount: &str) {
            let id = self.submit(self.equity.id, account.id, amount).await;
            assert_eq!(self.engine.execute(id).await.unwrap(), ExecutionOutcome::Completed);
        }

        async fn balance(&self, account: &Account) -> Decimal {
            self.store.balance_as_of(account.id, Utc::now()).await.unwrap()
        }
    }

    #[tokio::test]
    async fn test_transfer_full_balance_completes() {
        let h = Harness::new(EngineConfig::default()).await;
        let (a, b) = (h.account().await, h.account().await);
        h.fund(&a, "100.00").await;

        let id = h.submit(a.id, b.id, "100.00").await;
        assert_eq!(h.engine.execute(id).await.unwrap(), ExecutionOutcome::Completed);

        assert_eq!(h.balance(&a).await, dec!(0));
        assert_eq!(h.balance(&b).await, dec!(100));
        let entries = h.store.entries_for_transaction(id).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert!(is_balanced(&entries));

        let record = h.store.get_transaction(id).await.unwrap().unwrap();
        assert_eq!(record.status, TransactionStatus::Completed);
        assert!(record.processed_at.is_some());
        assert!(record.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_insufficient_funds_fails_without_entries() {
        let h = Harness::new(EngineConfig::default()).await;
        let (a, b) = (h.account().await, h.account().await);
        h.fund(&a, "50.00").await;

        let id = h.submit(a.id, b.id, "100.00").await;
        let outcome = h.engine.execute(id).await.unwrap();
        assert_eq!(
            outcome,
            ExecutionOutcome::Failed {
                reason: REASON_INSUFFICIENT_FUNDS.to_string()
            }
        );

        assert!(h.store.entries_for_transaction(id).await.unwrap().is_empty());
        assert_eq!(h.balance(&a).await, dec!(50));
        let record = h.store.get_transaction(id).await.unwrap().unwrap();
        assert_eq!(record.status, TransactionStatus::Failed);
        assert_eq!(record.error_message.as_deref(), Some(REASON_INSUFFICIENT_FUNDS));
    }

    #[tokio::test]
    async fn test_reexecution_is_benign() {
        let h = Harness::new(EngineConfig::default()).await;
        let (a, b) = (h.account().await, h.account().await);
        h.fund(&a, "10").await;
        let id = h.submit(a.id, b.id, "10").await;

        assert_eq!(h.engine.execute(id).await.unwrap(), ExecutionOutcome::Completed);
        let entries_after_first = h.store.entry_count().await;
        for _ in 0..2 {
            assert_eq!(
                h.engine.execute(id).await.unwrap(),
                ExecutionOutcome::AlreadyHandled
            );
        }
        assert_eq!(h.store.entry_count().await, entries_after_first);
    }

    #[tokio::test]
    async fn test_unknown_id_is_already_handled() {
        let h = Harness::new(EngineConfig::default()).await;
        assert_eq!(
            h.engine.execute(TransactionId::new()).await.unwrap(),
            ExecutionOutcome::AlreadyHandled
        );
    }

    #[tokio::test]
    async fn test_system_account_skips_funds_check() {
        let h = Harness::new(EngineConfig::default()).await;
        let a = h.account().await;
        h.fund(&a, "250.5").await;
        assert_eq!(h.balance(&h.equity).await, dec!(-250.5));
        assert_eq!(h.balance(&a).await, dec!(250.5));
    }

    #[tokio::test]
    async fn test_account_frozen_after_intake_fails() {
        let h = Harness::new(EngineConfig::default()).await;
        let (a, b) = (h.account().await, h.account().await);
        h.fund(&a, "10").await;
        let id = h.submit(a.id, b.id, "5").await;

        h.store
            .set_account_status(b.id, AccountStatus::Frozen)
            .await
            .unwrap();
        assert_eq!(
            h.engine.execute(id).await.unwrap(),
            ExecutionOutcome::Failed {
                reason: REASON_ACCOUNT_NOT_ACTIVE.to_string()
            }
        );
        assert_eq!(h.balance(&a).await, dec!(10));
    }

    #[tokio::test]
    async fn test_storage_fault_rolls_back_to_pending() {
        let h = Harness::new(EngineConfig::default()).await;
        let (a, b) = (h.account().await, h.account().await);
        h.fund(&a, "10").await;
        let id = h.submit(a.id, b.id, "10").await;

        h.store.fail_entry_writes(true);
        let err = h.engine.execute(id).await.unwrap_err();
        assert!(err.is_transient());

        let record = h.store.get_transaction(id).await.unwrap().unwrap();
        assert_eq!(record.status, TransactionStatus::Pending);
        assert!(record.processed_at.is_none());
        assert!(h.store.entries_for_transaction(id).await.unwrap().is_empty());

        // retry after the fault clears
        h.store.fail_entry_writes(false);
        assert_eq!(h.engine.execute(id).await.unwrap(), ExecutionOutcome::Completed);
    }

    #[tokio::test]
    async fn test_timeout_leaves_transaction_unclaimed() {
        let h = Harness::new(EngineConfig {
            unit_timeout: Duration::from_millis(50),
        })
        .await;
        let (a, b) = (h.account().await, h.account().await);
        h.fund(&a, "10").await;
        let id = h.submit(a.id, b.id, "10").await;

        h.store.delay_entry_writes(Some(Duration::from_millis(500)));
        let err = h.engine.execute(id).await.unwrap_err();
        assert!(matches!(err, TransferError::Timeout(50)));

        let record = h.store.get_transaction(id).await.unwrap().unwrap();
        assert_eq!(record.status, TransactionStatus::Pending);

        h.store.delay_entry_writes(None);
        assert_eq!(h.engine.execute(id).await.unwrap(), ExecutionOutcome::Completed);
        assert_eq!(h.balance(&b).await, dec!(10));
    }

    #[test]
    fn test_outcome_status() {
        assert_eq!(
            ExecutionOutcome::Completed.status(),
            Some(TransactionStatus::Completed)
        );
        assert_eq!(ExecutionOutcome::AlreadyHandled.status(), None);
    }
}

//! Transfer Service
//!
//! Entry point for the request-handling collaborator: intake (gateway, then
//! inline execution or dispatch) plus the read-side queries over
//! transactions, balances and ledger entries.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};

use super::engine::{EngineConfig, ExecutionOutcome, TransferEngine};
use super::error::TransferError;
use super::gateway::{Admission, IdempotencyGateway};
use super::state::TransactionStatus;
use super::types::{TransactionDetail, TransferIntent, TransferReceipt};
use crate::account::{Account, AccountBalance, AccountKind, AccountStatus};
use crate::core_types::{AccountId, TransactionId};
use crate::dispatch::{DispatchMessage, DispatchQueue};
use crate::ledger::{LedgerEntry, is_balanced};
use crate::money::parse_currency;
use crate::store::{LedgerStore, clamp_entry_limit};

/// Transfer Service
pub struct TransferService {
    store: Arc<dyn LedgerStore>,
    gateway: IdempotencyGateway,
    engine: Arc<TransferEngine>,
    dispatcher: Option<Arc<dyn DispatchQueue>>,
}

impl TransferService {
    /// Service executing transfers inline
    pub fn new(store: Arc<dyn LedgerStore>, engine_config: EngineConfig) -> Self {
        let engine = Arc::new(TransferEngine::with_config(store.clone(), engine_config));
        Self::with_engine(store, engine)
    }

    pub fn with_engine(store: Arc<dyn LedgerStore>, engine: Arc<TransferEngine>) -> Self {
        Self {
            gateway: IdempotencyGateway::new(store.clone()),
            store,
            engine,
            dispatcher: None,
        }
    }

    /// Hand new transactions to `queue` instead of executing them inline
    pub fn with_dispatcher(mut self, queue: Arc<dyn DispatchQueue>) -> Self {
        self.dispatcher = Some(queue);
        self
    }

    pub fn engine(&self) -> &Arc<TransferEngine> {
        &self.engine
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    // === Intake ===

    /// Admit a transfer and start its execution.
    ///
    /// A repeated key returns the existing transaction's current status. A
    /// new transaction reports `pending` when dispatched, or its final
    /// status when executed inline. Inline system faults leave it `pending`
    /// for recovery and are not surfaced here.
    pub async fn submit(&self, intent: &TransferIntent) -> Result<TransferReceipt, TransferError> {
        let record = match self.gateway.admit(intent).await? {
            Admission::Existing(record) => return Ok(TransferReceipt::from(&record)),
            Admission::Created(record) => record,
        };
        let mut receipt = TransferReceipt::from(&record);

        if let Some(queue) = &self.dispatcher {
            if let Err(e) = queue.publish(&DispatchMessage::for_record(&record)).await {
                warn!(
                    transaction_id = %record.id,
                    error = %e,
                    "Publish failed, transaction left pending for recovery"
                );
            }
            return Ok(receipt);
        }

        match self.engine.execute(record.id).await {
            Ok(ExecutionOutcome::AlreadyHandled) => {
                if let Some(current) = self.store.get_transaction(record.id).await? {
                    receipt.status = current.status;
                }
            }
            Ok(outcome) => {
                receipt.status = outcome.status().unwrap_or(TransactionStatus::Pending);
            }
            Err(e) => {
                warn!(
                    transaction_id = %record.id,
                    error = %e,
                    "Inline execution failed, transaction left pending"
                );
            }
        }
        Ok(receipt)
    }

    // === Queries ===

    pub async fn transaction_detail(
        &self,
        id: TransactionId,
    ) -> Result<TransactionDetail, TransferError> {
        let record = self
            .store
            .get_transaction(id)
            .await?
            .ok_or_else(|| TransferError::TransactionNotFound(id.to_string()))?;
        Ok(TransactionDetail::from(&record))
    }

    /// Balance now, or as of a past instant
    pub async fn balance(
        &self,
        account_id: AccountId,
        as_of: Option<DateTime<Utc>>,
    ) -> Result<AccountBalance, TransferError> {
        let account = self.require_account(account_id).await?;
        let as_of = as_of.unwrap_or_else(Utc::now);
        let balance = self.store.balance_as_of(account_id, as_of).await?;

        Ok(AccountBalance {
            account_id,
            balance,
            currency: account.currency,
            as_of,
        })
    }

    /// Entries of one transaction, oldest first
    pub async fn ledger_entries(&self, id: TransactionId) -> Result<Vec<LedgerEntry>, TransferError> {
        self.require_transaction(id).await?;
        self.store.entries_for_transaction(id).await
    }

    /// Entries of one account, newest first
    pub async fn account_entries(
        &self,
        account_id: AccountId,
        limit: Option<i64>,
    ) -> Result<Vec<LedgerEntry>, TransferError> {
        self.require_account(account_id).await?;
        let limit = clamp_entry_limit(limit.unwrap_or(0));
        self.store.entries_for_account(account_id, limit).await
    }

    /// Whether the transaction's entries sum to exactly zero
    pub async fn verify_transaction_balance(&self, id: TransactionId) -> Result<bool, TransferError> {
        let entries = self.ledger_entries(id).await?;
        Ok(is_balanced(&entries))
    }

    // === Account administration ===

    /// Open a customer account. System accounts are provisioned at bootstrap only.
    pub async fn open_account(
        &self,
        kind: AccountKind,
        currency: &str,
    ) -> Result<Account, TransferError> {
        if kind.is_system() {
            return Err(TransferError::InvalidAccountKind(kind.to_string()));
        }
        let currency = parse_currency(currency)?;
        let account = Account::new(kind, currency);
        self.store.insert_account(&account).await?;

        info!(
            account_id = %account.id,
            account_number = %account.account_number,
            kind = %account.kind,
            currency = %account.currency,
            "Account opened"
        );
        Ok(account)
    }

    pub async fn set_account_status(
        &self,
        account_id: AccountId,
        status: AccountStatus,
    ) -> Result<(), TransferError> {
        if !self.store.set_account_status(account_id, status).await? {
            return Err(TransferError::AccountNotFound(account_id.to_string()));
        }
        info!(account_id = %account_id, status = %status, "Account status changed");
        Ok(())
    }

    async fn require_account(&self, id: AccountId) -> Result<Account, TransferError> {
        self.store
            .get_account(id)
            .await?
            .ok_or_else(|| TransferError::AccountNotFound(id.to_string()))
    }

    async fn require_transaction(&self, id: TransactionId) -> Result<(), TransferError> {
        match self.store.get_transaction(id).await? {
            Some(_) => Ok(()),
            None => Err(TransferError::TransactionNotFound(id.to_string())),
        }
    }
}

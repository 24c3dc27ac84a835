//! Idempotency Gateway
//!
//! Check-or-create of a Transaction Record against the client-supplied
//! idempotency key. The store's UNIQUE constraint on the key decides races:
//! a lost insert re-fetches the winner's row and returns it as if it had
//! been found up front.

use std::sync::Arc;
use tracing::{debug, info, warn};

use super::error::TransferError;
use super::types::{MAX_IDEMPOTENCY_KEY_LEN, TransactionRecord, TransferIntent};
use crate::money::{parse_amount, parse_currency};
use crate::store::{InsertOutcome, LedgerStore};

/// Result of admitting a transfer intent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// A new PENDING record was written by this call
    Created(TransactionRecord),
    /// A record already existed for the key (any status)
    Existing(TransactionRecord),
}

impl Admission {
    pub fn record(&self) -> &TransactionRecord {
        match self {
            Admission::Created(record) | Admission::Existing(record) => record,
        }
    }

    pub fn into_record(self) -> TransactionRecord {
        match self {
            Admission::Created(record) | Admission::Existing(record) => record,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Admission::Created(_))
    }
}

/// Idempotency Gateway
pub struct IdempotencyGateway {
    store: Arc<dyn LedgerStore>,
}

impl IdempotencyGateway {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Return the record for `intent.idempotency_key`, creating it if absent.
    ///
    /// Validation runs only when no record exists yet; a validation error
    /// creates nothing.
    pub async fn admit(&self, intent: &TransferIntent) -> Result<Admission, TransferError> {
        let key = validate_key(&intent.idempotency_key)?;

        if let Some(existing) = self.store.get_transaction_by_key(key).await? {
            self.warn_on_payload_drift(&existing, intent);
            debug!(
                transaction_id = %existing.id,
                idempotency_key = %key,
                status = %existing.status,
                "Idempotency key already recorded"
            );
            return Ok(Admission::Existing(existing));
        }

        let record = self.validate(key, intent).await?;
        let parties = record.parties();

        match self.store.insert_transaction(&record, &parties).await? {
            InsertOutcome::Created => {
                info!(
                    transaction_id = %record.id,
                    idempotency_key = %key,
                    source = %record.source_account_id,
                    destination = %record.destination_account_id,
                    amount = %record.amount,
                    currency = %record.currency,
                    "Transfer recorded"
                );
                Ok(Admission::Created(record))
            }
            InsertOutcome::DuplicateKey => {
                let existing = self.store.get_transaction_by_key(key).await?.ok_or_else(|| {
                    TransferError::SystemError(format!(
                        "idempotency key {} rejected as duplicate but no record found",
                        key
                    ))
                })?;
                self.warn_on_payload_drift(&existing, intent);
                debug!(
                    transaction_id = %existing.id,
                    idempotency_key = %key,
                    "Lost idempotency race, returning winner"
                );
                Ok(Admission::Existing(existing))
            }
        }
    }

    /// Build the PENDING record after checking the intent against the accounts
    async fn validate(
        &self,
        key: &str,
        intent: &TransferIntent,
    ) -> Result<TransactionRecord, TransferError> {
        if intent.source_account_id == intent.destination_account_id {
            return Err(TransferError::SameAccount);
        }
        let amount = parse_amount(&intent.amount)?;
        let currency = parse_currency(&intent.currency)?;

        let source = self
            .store
            .get_account(intent.source_account_id)
            .await?
            .ok_or(TransferError::SourceAccountNotFound)?;
        if !source.is_active() {
            return Err(TransferError::AccountNotActive(format!(
                "source account {} is {}",
                source.account_number, source.status
            )));
        }

        let destination = self
            .store
            .get_account(intent.destination_account_id)
            .await?
            .ok_or(TransferError::DestinationAccountNotFound)?;
        if !destination.is_active() {
            return Err(TransferError::AccountNotActive(format!(
                "destination account {} is {}",
                destination.account_number, destination.status
            )));
        }

        if source.currency != destination.currency {
            return Err(TransferError::CurrencyMismatch);
        }
        if currency != source.currency {
            return Err(TransferError::RequestCurrencyMismatch);
        }

        Ok(TransactionRecord::pending(
            key,
            source.id,
            destination.id,
            amount,
            currency,
            intent.reference.clone(),
        ))
    }

    fn warn_on_payload_drift(&self, existing: &TransactionRecord, intent: &TransferIntent) {
        let same = match (parse_amount(&intent.amount), parse_currency(&intent.currency)) {
            (Ok(amount), Ok(currency)) => existing.matches(
                intent.source_account_id,
                intent.destination_account_id,
                amount,
                &currency,
            ),
            _ => false,
        };
        if !same {
            warn!(
                transaction_id = %existing.id,
                idempotency_key = %existing.idempotency_key,
                "Idempotency key reused with a different payload; returning original transaction"
            );
        }
    }
}

fn validate_key(key: &str) -> Result<&str, TransferError> {
    let key = key.trim();
    if key.is_empty() {
        return Err(TransferError::MissingIdempotencyKey);
    }
    if key.chars().count() > MAX_IDEMPOTENCY_KEY_LEN {
        return Err(TransferError::IdempotencyKeyTooLong(MAX_IDEMPOTENCY_KEY_LEN));
    }
    Ok(key)
}

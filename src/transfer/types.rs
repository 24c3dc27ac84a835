//! Transfer Core Types
//!
//! Transaction Record, Transaction Party, the inbound Transfer Intent and the
//! views handed back to callers.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::state::TransactionStatus;
use crate::core_types::{AccountId, TransactionId};
use crate::money::format_amount;

/// Maximum idempotency key length (`VARCHAR(255)`)
pub const MAX_IDEMPOTENCY_KEY_LEN: usize = 255;

/// Transaction kind, also used as the dispatch type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Transfer,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Transfer => "transfer",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "transfer" => Ok(TransactionKind::Transfer),
            other => Err(format!("unknown transaction kind: {}", other)),
        }
    }
}

/// Role of an account within a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartyRole {
    Source,
    Destination,
}

impl PartyRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            PartyRole::Source => "source",
            PartyRole::Destination => "destination",
        }
    }
}

impl fmt::Display for PartyRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PartyRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "source" => Ok(PartyRole::Source),
            "destination" => Ok(PartyRole::Destination),
            other => Err(format!("unknown party role: {}", other)),
        }
    }
}

/// Links a transaction to an account it touches. Written at intake, read-only afterward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionParty {
    pub id: Uuid,
    pub transaction_id: TransactionId,
    pub account_id: AccountId,
    pub role: PartyRole,
}

impl TransactionParty {
    pub fn new(transaction_id: TransactionId, account_id: AccountId, role: PartyRole) -> Self {
        Self {
            id: Uuid::new_v4(),
            transaction_id,
            account_id,
            role,
        }
    }
}

/// Recover `(source, destination)` from a transaction's parties.
///
/// Returns `None` unless exactly one party holds each role.
pub fn resolve_parties(parties: &[TransactionParty]) -> Option<(AccountId, AccountId)> {
    let mut sources = parties.iter().filter(|p| p.role == PartyRole::Source);
    let mut destinations = parties.iter().filter(|p| p.role == PartyRole::Destination);

    let source = sources.next()?;
    let destination = destinations.next()?;
    if sources.next().is_some() || destinations.next().is_some() {
        return None;
    }
    Some((source.account_id, destination.account_id))
}

/// Transfer intent from the request-handling collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferIntent {
    pub idempotency_key: String,
    pub source_account_id: AccountId,
    pub destination_account_id: AccountId,
    /// Exact decimal as string (never a float)
    pub amount: String,
    /// 3-letter currency code
    pub currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

impl TransferIntent {
    pub fn new(
        idempotency_key: impl Into<String>,
        source_account_id: AccountId,
        destination_account_id: AccountId,
        amount: impl Into<String>,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            idempotency_key: idempotency_key.into(),
            source_account_id,
            destination_account_id,
            amount: amount.into(),
            currency: currency.into(),
            reference: None,
        }
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }
}

/// Transaction Record - one transfer intent and its lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRecord {
    pub id: TransactionId,
    pub idempotency_key: String,
    pub kind: TransactionKind,
    pub status: TransactionStatus,
    pub amount: Decimal,
    pub currency: String,
    pub source_account_id: AccountId,
    pub destination_account_id: AccountId,
    pub reference: Option<String>,
    pub initiated_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl TransactionRecord {
    /// New record in the initial PENDING state
    pub fn pending(
        idempotency_key: impl Into<String>,
        source_account_id: AccountId,
        destination_account_id: AccountId,
        amount: Decimal,
        currency: impl Into<String>,
        reference: Option<String>,
    ) -> Self {
        Self {
            id: TransactionId::new(),
            idempotency_key: idempotency_key.into(),
            kind: TransactionKind::Transfer,
            status: TransactionStatus::Pending,
            amount,
            currency: currency.into(),
            source_account_id,
            destination_account_id,
            reference,
            initiated_at: Utc::now(),
            processed_at: None,
            completed_at: None,
            error_message: None,
        }
    }

    /// The two party rows written alongside this record
    pub fn parties(&self) -> [TransactionParty; 2] {
        [
            TransactionParty::new(self.id, self.source_account_id, PartyRole::Source),
            TransactionParty::new(self.id, self.destination_account_id, PartyRole::Destination),
        ]
    }

    /// Whether an intent with the same key describes this same transfer
    pub fn matches(&self, source: AccountId, destination: AccountId, amount: Decimal, currency: &str) -> bool {
        self.source_account_id == source
            && self.destination_account_id == destination
            && self.amount == amount
            && self.currency == currency
    }
}

/// Synchronous result of intake
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferReceipt {
    pub transaction_id: TransactionId,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
}

impl From<&TransactionRecord> for TransferReceipt {
    fn from(record: &TransactionRecord) -> Self {
        Self {
            transaction_id: record.id,
            status: record.status,
            created_at: record.initiated_at,
        }
    }
}

/// Queryable transaction detail
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionDetail {
    pub transaction_id: TransactionId,
    pub status: TransactionStatus,
    pub source_account_id: AccountId,
    pub destination_account_id: AccountId,
    pub amount: String,
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    pub initiated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl From<&TransactionRecord> for TransactionDetail {
    fn from(record: &TransactionRecord) -> Self {
        Self {
            transaction_id: record.id,
            status: record.status,
            source_account_id: record.source_account_id,
            destination_account_id: record.destination_account_id,
            amount: format_amount(record.amount),
            currency: record.currency.clone(),
            reference: record.reference.clone(),
            initiated_at: record.initiated_at,
            completed_at: record.completed_at,
            error_message: record.error_message.clone(),
        }
    }
}

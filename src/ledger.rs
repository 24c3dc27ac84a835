//! Ledger - append-only record of signed money movements
//!
//! Every transfer writes exactly two entries: a debit (negative) on the
//! source and a credit (positive) on the destination. Entries are never
//! updated or deleted; a correction is a new offsetting transaction.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::core_types::{AccountId, EntryId, TransactionId};

/// Entry kind. Redundant with the sign of the amount, kept for auditability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Debit,
    Credit,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Debit => "debit",
            EntryKind::Credit => "credit",
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EntryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "debit" => Ok(EntryKind::Debit),
            "credit" => Ok(EntryKind::Credit),
            other => Err(format!("unknown entry kind: {}", other)),
        }
    }
}

/// One signed movement against one account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: EntryId,
    pub transaction_id: TransactionId,
    pub account_id: AccountId,
    /// Negative = debit, positive = credit. Never zero.
    #[serde(with = "rust_decimal::serde::str")]
    pub amount: Decimal,
    pub kind: EntryKind,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Amount is non-zero and its sign agrees with the kind
    pub fn is_well_formed(&self) -> bool {
        match self.kind {
            EntryKind::Debit => self.amount < Decimal::ZERO,
            EntryKind::Credit => self.amount > Decimal::ZERO,
        }
    }
}

/// Build the balanced debit/credit pair for a transfer.
///
/// Both entries share the transaction reference and a single timestamp.
/// `amount` must be positive; the caller validates this before claiming.
pub fn build_transfer_entries(
    transaction_id: TransactionId,
    source: AccountId,
    destination: AccountId,
    amount: Decimal,
    at: DateTime<Utc>,
) -> [LedgerEntry; 2] {
    [
        LedgerEntry {
            id: Uuid::new_v4(),
            transaction_id,
            account_id: source,
            amount: -amount,
            kind: EntryKind::Debit,
            created_at: at,
        },
        LedgerEntry {
            id: Uuid::new_v4(),
            transaction_id,
            account_id: destination,
            amount,
            kind: EntryKind::Credit,
            created_at: at,
        },
    ]
}

/// Sum of signed amounts
pub fn sum_entries<'a>(entries: impl IntoIterator<Item = &'a LedgerEntry>) -> Decimal {
    entries.into_iter().map(|e| e.amount).sum()
}

/// Balance invariant: a transaction's entries sum to exactly zero
pub fn is_balanced(entries: &[LedgerEntry]) -> bool {
    sum_entries(entries).is_zero()
}

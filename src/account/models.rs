//! Data models for accounts

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::core_types::AccountId;

/// Well-known account number of the bank's equity account
pub const BANK_EQUITY_ACCOUNT_NUMBER: &str = "BANK-EQUITY-001";

/// Account kind
///
/// `Equity` is the only system kind: it bypasses the funds check and may run
/// a negative balance, which is how money enters the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountKind {
    Checking,
    Savings,
    Loan,
    Equity,
}

impl AccountKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountKind::Checking => "checking",
            AccountKind::Savings => "savings",
            AccountKind::Loan => "loan",
            AccountKind::Equity => "equity",
        }
    }

    /// System accounts bypass the insufficient-funds check
    #[inline]
    pub fn is_system(&self) -> bool {
        matches!(self, AccountKind::Equity)
    }
}

impl fmt::Display for AccountKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AccountKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "checking" => Ok(AccountKind::Checking),
            "savings" => Ok(AccountKind::Savings),
            "loan" => Ok(AccountKind::Loan),
            "equity" => Ok(AccountKind::Equity),
            other => Err(format!("unknown account kind: {}", other)),
        }
    }
}

/// Account lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Frozen,
    Closed,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::Frozen => "frozen",
            AccountStatus::Closed => "closed",
        }
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AccountStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(AccountStatus::Active),
            "frozen" => Ok(AccountStatus::Frozen),
            "closed" => Ok(AccountStatus::Closed),
            other => Err(format!("unknown account status: {}", other)),
        }
    }
}

/// Account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub account_number: String,
    pub kind: AccountKind,
    pub currency: String,
    pub status: AccountStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// New active account with a generated account number
    pub fn new(kind: AccountKind, currency: impl Into<String>) -> Self {
        let id = AccountId::new();
        Self::with_number(id, generate_account_number(id), kind, currency)
    }

    pub fn with_number(
        id: AccountId,
        account_number: impl Into<String>,
        kind: AccountKind,
        currency: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            account_number: account_number.into(),
            kind,
            currency: currency.into(),
            status: AccountStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }

    #[inline]
    pub fn is_system(&self) -> bool {
        self.kind.is_system()
    }
}

/// Derived balance of an account at a point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountBalance {
    pub account_id: AccountId,
    #[serde(with = "rust_decimal::serde::str")]
    pub balance: Decimal,
    pub currency: String,
    pub as_of: DateTime<Utc>,
}

/// Account number: `FJ` + 10 digits taken from the account UUID
fn generate_account_number(id: AccountId) -> String {
    format!("FJ{:010}", id.inner().as_u128() % 10_000_000_000)
}

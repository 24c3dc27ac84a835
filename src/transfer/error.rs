//! Transfer Error Types
//!
//! Validation and system errors for intake, execution and dispatch.
//! Business failures (insufficient funds and the like) are not errors: they
//! end as a committed FAILED transaction, see
//! [`ExecutionOutcome`](super::engine::ExecutionOutcome).

use thiserror::Error;

use crate::money::MoneyError;

/// Transfer error types
#[derive(Error, Debug, Clone)]
pub enum TransferError {
    // === Validation Errors ===
    #[error("Idempotency key is required")]
    MissingIdempotencyKey,

    #[error("Idempotency key exceeds {0} characters")]
    IdempotencyKeyTooLong(usize),

    #[error("Source and destination accounts must be different")]
    SameAccount,

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid currency: {0}")]
    InvalidCurrency(String),

    #[error("Invalid account kind: {0}")]
    InvalidAccountKind(String),

    #[error("Source account not found")]
    SourceAccountNotFound,

    #[error("Destination account not found")]
    DestinationAccountNotFound,

    #[error("Account is not active: {0}")]
    AccountNotActive(String),

    #[error("Currency mismatch between accounts")]
    CurrencyMismatch,

    #[error("Request currency does not match account currency")]
    RequestCurrencyMismatch,

    // === Lookup Errors ===
    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    // === System Errors ===
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Internal system error: {0}")]
    SystemError(String),

    #[error("Unit of work timed out after {0} ms")]
    Timeout(u64),

    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    #[error("Dispatch error: {0}")]
    DispatchError(String),
}

impl TransferError {
    /// Get the error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            TransferError::MissingIdempotencyKey => "MISSING_IDEMPOTENCY_KEY",
            TransferError::IdempotencyKeyTooLong(_) => "IDEMPOTENCY_KEY_TOO_LONG",
            TransferError::SameAccount => "SAME_ACCOUNT",
            TransferError::InvalidAmount(_) => "INVALID_AMOUNT",
            TransferError::InvalidCurrency(_) => "INVALID_CURRENCY",
            TransferError::InvalidAccountKind(_) => "INVALID_ACCOUNT_KIND",
            TransferError::SourceAccountNotFound => "SOURCE_ACCOUNT_NOT_FOUND",
            TransferError::DestinationAccountNotFound => "DESTINATION_ACCOUNT_NOT_FOUND",
            TransferError::AccountNotActive(_) => "ACCOUNT_NOT_ACTIVE",
            TransferError::CurrencyMismatch => "CURRENCY_MISMATCH",
            TransferError::RequestCurrencyMismatch => "REQUEST_CURRENCY_MISMATCH",
            TransferError::TransactionNotFound(_) => "TRANSACTION_NOT_FOUND",
            TransferError::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            TransferError::DatabaseError(_) => "DATABASE_ERROR",
            TransferError::SystemError(_) => "SYSTEM_ERROR",
            TransferError::Timeout(_) => "TIMEOUT",
            TransferError::InvalidStateTransition(_) => "INVALID_STATE_TRANSITION",
            TransferError::DispatchError(_) => "DISPATCH_ERROR",
        }
    }

    /// Get HTTP status code suggestion
    pub fn http_status(&self) -> u16 {
        match self {
            TransferError::MissingIdempotencyKey
            | TransferError::IdempotencyKeyTooLong(_)
            | TransferError::SameAccount
            | TransferError::InvalidAmount(_)
            | TransferError::InvalidCurrency(_)
            | TransferError::InvalidAccountKind(_)
            | TransferError::SourceAccountNotFound
            | TransferError::DestinationAccountNotFound
            | TransferError::AccountNotActive(_)
            | TransferError::CurrencyMismatch
            | TransferError::RequestCurrencyMismatch => 400,
            TransferError::TransactionNotFound(_) | TransferError::AccountNotFound(_) => 404,
            TransferError::DatabaseError(_)
            | TransferError::SystemError(_)
            | TransferError::InvalidStateTransition(_) => 500,
            TransferError::DispatchError(_) => 503,
            TransferError::Timeout(_) => 504,
        }
    }

    /// Rejected before any record was created
    pub fn is_validation(&self) -> bool {
        self.http_status() == 400
    }

    /// System fault: the unit of work was rolled back and a retry is safe
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TransferError::DatabaseError(_)
                | TransferError::SystemError(_)
                | TransferError::Timeout(_)
                | TransferError::InvalidStateTransition(_)
                | TransferError::DispatchError(_)
        )
    }
}

impl From<sqlx::Error> for TransferError {
    fn from(e: sqlx::Error) -> Self {
        TransferError::DatabaseError(e.to_string())
    }
}

impl From<MoneyError> for TransferError {
    fn from(e: MoneyError) -> Self {
        match e {
            MoneyError::InvalidCurrency(code) => TransferError::InvalidCurrency(code),
            other => TransferError::InvalidAmount(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(TransferError::SameAccount.code(), "SAME_ACCOUNT");
        assert_eq!(TransferError::CurrencyMismatch.code(), "CURRENCY_MISMATCH");
        assert_eq!(TransferError::Timeout(5000).code(), "TIMEOUT");
    }

    #[test]
    fn test_http_status() {
        assert_eq!(TransferError::MissingIdempotencyKey.http_status(), 400);
        assert_eq!(TransferError::InvalidAmount("x".into()).http_status(), 400);
        assert_eq!(
            TransferError::TransactionNotFound("x".into()).http_status(),
            404
        );
        assert_eq!(TransferError::SystemError("test".into()).http_status(), 500);
        assert_eq!(TransferError::DispatchError("down".into()).http_status(), 503);
    }

    #[test]
    fn test_taxonomy() {
        assert!(TransferError::SameAccount.is_validation());
        assert!(!TransferError::SameAccount.is_transient());
        assert!(TransferError::DatabaseError("lost".into()).is_transient());
        assert!(TransferError::Timeout(100).is_transient());
        assert!(!TransferError::TransactionNotFound("x".into()).is_transient());
    }

    #[test]
    fn test_from_money_error() {
        let err: TransferError = MoneyError::InvalidAmount.into();
        assert!(matches!(err, TransferError::InvalidAmount(_)));

        let err: TransferError = MoneyError::InvalidCurrency("NO".into()).into();
        assert!(matches!(err, TransferError::InvalidCurrency(ref c) if c == "NO"));
    }

    #[test]
    fn test_display() {
        assert_eq!(
            TransferError::SameAccount.to_string(),
            "Source and destination accounts must be different"
        );
    }
}

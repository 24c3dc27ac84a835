//! System account provisioning
//!
//! The bank equity account is the funding source for customer accounts: it
//! is a system account, so the engine lets its balance go negative.

use tracing::info;

use crate::account::{Account, AccountKind, BANK_EQUITY_ACCOUNT_NUMBER};
use crate::core_types::AccountId;
use crate::money::parse_currency;
use crate::store::LedgerStore;
use crate::transfer::error::TransferError;

/// Create the equity account under `account_number` if it does not exist yet.
///
/// Returns the existing or newly created account.
pub async fn ensure_equity_account(
    store: &dyn LedgerStore,
    account_number: &str,
    currency: &str,
) -> Result<Account, TransferError> {
    if let Some(existing) = store.get_account_by_number(account_number).await? {
        info!(
            account_number = %existing.account_number,
            account_id = %existing.id,
            "Bank equity account already exists"
        );
        return Ok(existing);
    }

    let currency = parse_currency(currency)?;
    let account = Account::with_number(
        AccountId::new(),
        account_number,
        AccountKind::Equity,
        currency,
    );

    if let Err(e) = store.insert_account(&account).await {
        // A concurrent bootstrap may have won the unique account number.
        if let Some(existing) = store.get_account_by_number(account_number).await? {
            return Ok(existing);
        }
        return Err(e);
    }

    info!(
        account_number = %account.account_number,
        account_id = %account.id,
        currency = %account.currency,
        "Created bank equity account"
    );
    Ok(account)
}

/// [`ensure_equity_account`] with the default account number
pub async fn ensure_default_equity_account(
    store: &dyn LedgerStore,
    currency: &str,
) -> Result<Account, TransferError> {
    ensure_equity_account(store, BANK_EQUITY_ACCOUNT_NUMBER, currency).await
}

#![allow(dead_code)]

use std::sync::Arc;

use fjord_ledger::bootstrap::ensure_default_equity_account;
use fjord_ledger::{
    Account, AccountId, AccountKind, EngineConfig, ExecutionOutcome, LedgerStore,
    MemoryLedgerStore, TransactionId, TransferEngine, TransferIntent, TransferService,
};
use rust_decimal::Decimal;

/// In-memory ledger with a funded equity account
pub struct Ledger {
    pub store: Arc<MemoryLedgerStore>,
    pub service: TransferService,
    pub equity: Account,
}

impl Ledger {
    pub async fn new() -> Self {
        Self::with_config(EngineConfig::default()).await
    }

    pub async fn with_config(config: EngineConfig) -> Self {
        let store = Arc::new(MemoryLedgerStore::new());
        let equity = ensure_default_equity_account(store.as_ref(), "NOK")
            .await
            .unwrap();
        let service = TransferService::new(store.clone(), config);
        Self {
            store,
            service,
            equity,
        }
    }

    pub fn engine(&self) -> &Arc<TransferEngine> {
        self.service.engine()
    }

    pub async fn open(&self) -> Account {
        self.service
            .open_account(AccountKind::Checking, "NOK")
            .await
            .unwrap()
    }

    /// Open an account and fund it from equity
    pub async fn open_with(&self, amount: &str) -> Account {
        let account = self.open().await;
        let receipt = self
            .service
            .submit(&intent(self.equity.id, account.id, amount))
            .await
            .unwrap();
        assert_eq!(receipt.status.as_str(), "completed");
        account
    }

    pub async fn balance(&self, account: &Account) -> Decimal {
        self.service.balance(account.id, None).await.unwrap().balance
    }

    /// Record a transfer without executing it
    pub async fn record(&self, from: AccountId, to: AccountId, amount: &str) -> TransactionId {
        let gateway = fjord_ledger::IdempotencyGateway::new(self.store.clone());
        gateway
            .admit(&intent(from, to, amount))
            .await
            .unwrap()
            .into_record()
            .id
    }

    pub async fn execute(&self, id: TransactionId) -> ExecutionOutcome {
        self.engine().execute(id).await.unwrap()
    }

    pub async fn entry_count_for(&self, id: TransactionId) -> usize {
        self.store.entries_for_transaction(id).await.unwrap().len()
    }
}

pub fn intent(from: AccountId, to: AccountId, amount: &str) -> TransferIntent {
    TransferIntent::new(uuid::Uuid::new_v4().to_string(), from, to, amount, "NOK")
}

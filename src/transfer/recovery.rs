//! Recovery Worker
//!
//! Background worker that picks up transactions left PENDING, e.g. after a
//! failed publish or a worker crash, and hands them back for execution.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::engine::TransferEngine;
use super::error::TransferError;
use crate::dispatch::{DispatchMessage, DispatchQueue};
use crate::store::LedgerStore;

/// Configuration for the recovery worker
#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    /// How often to scan for stale transactions
    pub scan_interval: Duration,
    /// How long a transaction must sit in PENDING to be considered stale
    pub stale_threshold: Duration,
    /// Maximum transactions to recover per scan
    pub batch_size: i64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_secs(30),
            stale_threshold: Duration::from_secs(60),
            batch_size: 100,
        }
    }
}

/// Recovery Worker
///
/// With a dispatcher, stale transactions with no outstanding message are
/// republished; without one they are executed inline. Either way the engine's claim makes a duplicate
/// attempt harmless.
pub struct RecoveryWorker {
    store: Arc<dyn LedgerStore>,
    engine: Arc<TransferEngine>,
    dispatcher: Option<Arc<dyn DispatchQueue>>,
    config: RecoveryConfig,
}

impl RecoveryWorker {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        engine: Arc<TransferEngine>,
        dispatcher: Option<Arc<dyn DispatchQueue>>,
        config: RecoveryConfig,
    ) -> Self {
        Self {
            store,
            engine,
            dispatcher,
            config,
        }
    }

    /// Run until `shutdown` turns true
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            scan_interval_secs = self.config.scan_interval.as_secs(),
            stale_threshold_secs = self.config.stale_threshold.as_secs(),
            mode = if self.dispatcher.is_some() { "republish" } else { "inline" },
            "Starting recovery worker"
        );

        while !*shutdown.borrow() {
            if let Err(e) = self.scan_and_recover().await {
                error!(error = %e, "Recovery scan failed");
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.scan_interval) => {}
                Ok(()) = shutdown.changed() => {}
            }
        }

        info!("Recovery worker stopped");
    }

    /// Run a single scan. Returns how many transactions were handed back.
    pub async fn scan_and_recover(&self) -> Result<usize, TransferError> {
        let stale = self
            .store
            .find_stale_pending(self.config.stale_threshold, self.config.batch_size)
            .await?;

        if stale.is_empty() {
            debug!("No stale pending transactions found");
            return Ok(0);
        }

        info!(count = stale.len(), "Found stale pending transactions");

        let mut recovered = 0;
        for record in &stale {
            match &self.dispatcher {
                Some(queue) => {
                    // A queued or in-flight message will still reach a worker.
                    match queue.is_outstanding(record.id).await {
                        Ok(true) => {
                            debug!(transaction_id = %record.id, "Message still outstanding, skipping");
                            continue;
                        }
                        Ok(false) => {}
                        Err(e) => {
                            warn!(transaction_id = %record.id, error = %e, "Outstanding check failed");
                            continue;
                        }
                    }
                    match queue.publish(&DispatchMessage::for_record(record)).await {
                        Ok(()) => {
                            debug!(transaction_id = %record.id, "Republished stale transaction");
                            recovered += 1;
                        }
                        Err(e) => {
                            warn!(transaction_id = %record.id, error = %e, "Republish failed");
                        }
                    }
                }
                None => match self.engine.execute(record.id).await {
                    Ok(outcome) => {
                        if outcome.status().is_some() {
                            recovered += 1;
                        }
                    }
                    Err(e) => {
                        error!(transaction_id = %record.id, error = %e, "Failed to recover transaction");
                    }
                },
            }
        }

        if recovered > 0 {
            info!(count = recovered, "Recovered transactions this scan");
        }

        Ok(recovered)
    }
}

//! Dispatch Worker
//!
//! Drains the dispatch queue into the engine. Completed, failed and
//! already-handled outcomes are acknowledged; system errors are not, so the
//! message comes back after the visibility timeout.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::DispatchQueue;
use crate::transfer::engine::{ExecutionOutcome, TransferEngine};
use crate::transfer::error::TransferError;

/// Configuration for the dispatch worker
#[derive(Debug, Clone)]
pub struct DispatchWorkerConfig {
    /// Bounded wait per receive; shutdown is checked between waits
    pub receive_timeout: Duration,
    /// Pause after a failed receive or execution
    pub error_backoff: Duration,
}

impl Default for DispatchWorkerConfig {
    fn default() -> Self {
        Self {
            receive_timeout: Duration::from_secs(5),
            error_backoff: Duration::from_secs(1),
        }
    }
}

/// Dispatch Worker
pub struct DispatchWorker {
    queue: Arc<dyn DispatchQueue>,
    engine: Arc<TransferEngine>,
    config: DispatchWorkerConfig,
}

impl DispatchWorker {
    pub fn new(
        queue: Arc<dyn DispatchQueue>,
        engine: Arc<TransferEngine>,
        config: DispatchWorkerConfig,
    ) -> Self {
        Self {
            queue,
            engine,
            config,
        }
    }

    /// Receive and process at most one message.
    ///
    /// `Ok(None)` means the wait expired with nothing to do. On `Err` the
    /// message, if any, was left unacknowledged.
    pub async fn process_next(&self) -> Result<Option<ExecutionOutcome>, TransferError> {
        let delivery = match self.queue.receive(self.config.receive_timeout).await {
            Ok(Some(delivery)) => delivery,
            Ok(None) => return Ok(None),
            Err(e) => {
                error!(queue = self.queue.name(), error = %e, "Receive failed");
                return Err(e);
            }
        };
        let id = delivery.message.transaction_id;

        if delivery.is_redelivery() {
            warn!(
                transaction_id = %id,
                attempts = delivery.attempts,
                "Processing redelivered message"
            );
        } else {
            debug!(transaction_id = %id, kind = %delivery.message.kind, "Processing message");
        }

        let outcome = match self.engine.execute(id).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(
                    transaction_id = %id,
                    error = %e,
                    "Execution failed, leaving message for redelivery"
                );
                return Err(e);
            }
        };

        self.queue.ack(&delivery).await?;

        match &outcome {
            ExecutionOutcome::Completed => {
                info!(transaction_id = %id, "Transaction completed")
            }
            ExecutionOutcome::Failed { reason } => {
                info!(transaction_id = %id, reason = %reason, "Transaction failed")
            }
            ExecutionOutcome::AlreadyHandled => {
                debug!(transaction_id = %id, "Transaction already handled")
            }
        }
        Ok(Some(outcome))
    }

    /// Run until `shutdown` turns true. Returns the number of messages processed.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> u64 {
        info!(
            queue = self.queue.name(),
            receive_timeout_ms = self.config.receive_timeout.as_millis() as u64,
            "Dispatch worker started"
        );

        let mut processed = 0u64;
        while !*shutdown.borrow() {
            match self.process_next().await {
                Ok(Some(_)) => processed += 1,
                Ok(None) => {}
                Err(_) => {
                    tokio::select! {
                        _ = tokio::time::sleep(self.config.error_backoff) => {}
                        Ok(()) = shutdown.changed() => {}
                    }
                }
            }
        }

        info!(processed = processed, "Dispatch worker stopped");
        processed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_config_default() {
        let config = DispatchWorkerConfig::default();
        assert_eq!(config.receive_timeout, Duration::from_secs(5));
        assert_eq!(config.error_backoff, Duration::from_secs(1));
    }
}

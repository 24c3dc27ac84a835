//! Dispatch Layer
//!
//! Decouples "record accepted" from "record executed" through an
//! at-least-once channel. Messages carry only the transaction id and a type
//! tag; consumers re-read everything else from the store.
//!
//! A delivery that is not acknowledged becomes visible again after the
//! queue's visibility timeout. No deduplication happens here: the engine's
//! claim makes repeated deliveries harmless.

pub mod memory;
pub mod postgres;
pub mod worker;

pub use memory::MemoryDispatchQueue;
pub use postgres::PgDispatchQueue;
pub use worker::{DispatchWorker, DispatchWorkerConfig};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::core_types::TransactionId;
use crate::transfer::error::TransferError;
use crate::transfer::types::{TransactionKind, TransactionRecord};

/// Message placed on the channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchMessage {
    pub transaction_id: TransactionId,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub published_at: DateTime<Utc>,
}

impl DispatchMessage {
    pub fn new(transaction_id: TransactionId, kind: TransactionKind) -> Self {
        Self {
            transaction_id,
            kind,
            published_at: Utc::now(),
        }
    }

    pub fn for_record(record: &TransactionRecord) -> Self {
        Self::new(record.id, record.kind)
    }
}

/// A received message, held invisible to other consumers until acked or expired
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Queue-assigned handle used to acknowledge
    pub receipt: i64,
    pub message: DispatchMessage,
    /// 1 on first delivery
    pub attempts: u32,
}

impl Delivery {
    pub fn is_redelivery(&self) -> bool {
        self.attempts > 1
    }
}

/// At-least-once delivery channel
#[async_trait]
pub trait DispatchQueue: Send + Sync {
    /// Get backend name for logging
    fn name(&self) -> &'static str;

    /// Append a message at the tail
    async fn publish(&self, message: &DispatchMessage) -> Result<(), TransferError>;

    /// Wait up to `wait` for the oldest visible message
    async fn receive(&self, wait: Duration) -> Result<Option<Delivery>, TransferError>;

    /// Remove a delivered message for good
    async fn ack(&self, delivery: &Delivery) -> Result<(), TransferError>;

    /// Messages not yet acknowledged, visible or in flight
    async fn depth(&self) -> Result<u64, TransferError>;

    /// Whether an unacknowledged message for `transaction_id` is queued or in flight
    async fn is_outstanding(&self, transaction_id: TransactionId) -> Result<bool, TransferError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_carries_only_id_and_tag() {
        let message = DispatchMessage::new(TransactionId::new(), TransactionKind::Transfer);
        let json = serde_json::to_value(&message).unwrap();
        let object = json.as_object().unwrap();

        assert_eq!(object.len(), 3);
        assert_eq!(json["type"], "transfer");
        assert_eq!(json["transaction_id"], message.transaction_id.to_string());
    }
}

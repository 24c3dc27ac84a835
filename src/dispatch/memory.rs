//! In-process dispatch queue with visibility timeouts

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

use super::{Delivery, DispatchMessage, DispatchQueue};
use crate::core_types::TransactionId;
use crate::transfer::error::TransferError;

/// Re-check interval for expired in-flight messages while waiting
const EXPIRY_POLL: Duration = Duration::from_millis(20);

#[derive(Default)]
struct QueueState {
    next_receipt: i64,
    ready: VecDeque<Delivery>,
    in_flight: HashMap<i64, (Delivery, Instant)>,
}

impl QueueState {
    /// Move expired in-flight messages back to the head, oldest receipt first
    fn requeue_expired(&mut self, now: Instant) {
        let mut expired: Vec<i64> = self
            .in_flight
            .iter()
            .filter(|(_, (_, deadline))| *deadline <= now)
            .map(|(receipt, _)| *receipt)
            .collect();
        expired.sort_unstable_by(|a, b| b.cmp(a));
        for receipt in expired {
            if let Some((delivery, _)) = self.in_flight.remove(&receipt) {
                self.ready.push_front(delivery);
            }
        }
    }
}

/// In-memory at-least-once queue
pub struct MemoryDispatchQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    visibility_timeout: Duration,
}

impl MemoryDispatchQueue {
    pub fn new(visibility_timeout: Duration) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            visibility_timeout,
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, QueueState>, TransferError> {
        self.state
            .lock()
            .map_err(|_| TransferError::DispatchError("queue state poisoned".to_string()))
    }

    fn try_take(&self) -> Result<Option<Delivery>, TransferError> {
        let now = Instant::now();
        let mut state = self.lock()?;
        state.requeue_expired(now);

        let Some(mut delivery) = state.ready.pop_front() else {
            return Ok(None);
        };
        delivery.attempts += 1;
        state.in_flight.insert(
            delivery.receipt,
            (delivery.clone(), now + self.visibility_timeout),
        );
        Ok(Some(delivery))
    }
}

#[async_trait]
impl DispatchQueue for MemoryDispatchQueue {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn publish(&self, message: &DispatchMessage) -> Result<(), TransferError> {
        {
            let mut state = self.lock()?;
            state.next_receipt += 1;
            let receipt = state.next_receipt;
            state.ready.push_back(Delivery {
                receipt,
                message: message.clone(),
                attempts: 0,
            });
        }
        self.notify.notify_one();
        Ok(())
    }

    async fn receive(&self, wait: Duration) -> Result<Option<Delivery>, TransferError> {
        let deadline = Instant::now() + wait;
        loop {
            if let Some(delivery) = self.try_take()? {
                return Ok(Some(delivery));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            let nap = (deadline - now).min(EXPIRY_POLL);
            let _ = tokio::time::timeout(nap, self.notify.notified()).await;
        }
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), TransferError> {
        let mut state = self.lock()?;
        state.in_flight.remove(&delivery.receipt);
        Ok(())
    }

    async fn depth(&self) -> Result<u64, TransferError> {
        let state = self.lock()?;
        Ok((state.ready.len() + state.in_flight.len()) as u64)
    }

    async fn is_outstanding(&self, transaction_id: TransactionId) -> Result<bool, TransferError> {
        let state = self.lock()?;
        Ok(state
            .ready
            .iter()
            .chain(state.in_flight.values().map(|(delivery, _)| delivery))
            .any(|delivery| delivery.message.transaction_id == transaction_id))
    }
}

//! PostgreSQL-backed dispatch queue
//!
//! Rows in `dispatch_queue` are messages. Receiving pushes `visible_at`
//! forward by the visibility timeout (`FOR UPDATE SKIP LOCKED` keeps
//! concurrent consumers off the same row); acking deletes the row.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

use super::{Delivery, DispatchMessage, DispatchQueue};
use crate::core_types::TransactionId;
use crate::transfer::error::TransferError;
use crate::transfer::types::TransactionKind;

/// Durable queue over the shared database
pub struct PgDispatchQueue {
    pool: PgPool,
    visibility_timeout: Duration,
    poll_interval: Duration,
}

impl PgDispatchQueue {
    pub fn new(pool: PgPool, visibility_timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            pool,
            visibility_timeout,
            poll_interval,
        }
    }

    async fn try_take(&self) -> Result<Option<Delivery>, TransferError> {
        loop {
            let row = sqlx::query(
                r#"
                UPDATE dispatch_queue
                SET visible_at = NOW() + INTERVAL '1 millisecond' * $1,
                    attempts = attempts + 1
                WHERE id = (
                    SELECT id FROM dispatch_queue
                    WHERE visible_at <= NOW()
                    ORDER BY id
                    FOR UPDATE SKIP LOCKED
                    LIMIT 1
                )
                RETURNING id, transaction_id, kind, published_at, attempts
                "#,
            )
            .bind(self.visibility_timeout.as_millis() as f64)
            .fetch_optional(&self.pool)
            .await?;

            let Some(row) = row else {
                return Ok(None);
            };

            match row_to_delivery(&row) {
                Ok(delivery) => return Ok(Some(delivery)),
                Err(e) => {
                    // Undecodable rows would otherwise come back forever.
                    let id: i64 = row.try_get("id")?;
                    warn!(receipt = id, error = %e, "Dropping malformed dispatch message");
                    sqlx::query("DELETE FROM dispatch_queue WHERE id = $1")
                        .bind(id)
                        .execute(&self.pool)
                        .await?;
                }
            }
        }
    }
}

#[async_trait]
impl DispatchQueue for PgDispatchQueue {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn publish(&self, message: &DispatchMessage) -> Result<(), TransferError> {
        sqlx::query(
            r#"
            INSERT INTO dispatch_queue (transaction_id, kind, published_at, visible_at)
            VALUES ($1, $2, $3, NOW())
            "#,
        )
        .bind(message.transaction_id)
        .bind(message.kind.as_str())
        .bind(message.published_at)
        .execute(&self.pool)
        .await
        .map_err(|e| TransferError::DispatchError(e.to_string()))?;

        Ok(())
    }

    async fn receive(&self, wait: Duration) -> Result<Option<Delivery>, TransferError> {
        let deadline = Instant::now() + wait;
        loop {
            if let Some(delivery) = self.try_take().await? {
                return Ok(Some(delivery));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            tokio::time::sleep((deadline - now).min(self.poll_interval)).await;
        }
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), TransferError> {
        sqlx::query("DELETE FROM dispatch_queue WHERE id = $1")
            .bind(delivery.receipt)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn depth(&self) -> Result<u64, TransferError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM dispatch_queue")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn is_outstanding(&self, transaction_id: TransactionId) -> Result<bool, TransferError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM dispatch_queue WHERE transaction_id = $1)",
        )
        .bind(transaction_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }
}

fn row_to_delivery(row: &PgRow) -> Result<Delivery, TransferError> {
    let kind: String = row.try_get("kind")?;
    let kind: TransactionKind = kind.parse().map_err(TransferError::DispatchError)?;
    let attempts: i32 = row.try_get("attempts")?;

    Ok(Delivery {
        receipt: row.try_get("id")?,
        message: DispatchMessage {
            transaction_id: row.try_get("transaction_id")?,
            kind,
            published_at: row.try_get("published_at")?,
        },
        attempts: attempts.max(0) as u32,
    })
}

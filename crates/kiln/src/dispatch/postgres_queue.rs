use async_trait::async_trait;
use sqlx::{Row, postgres::PgPool};
use std::time::Duration;

use super::{Delivery, DispatchMessage, DispatchQueue, Result};

/// Durable queue on the `dispatch_messages` table.
///
/// A consumed row is leased until `locked_until`; if the worker dies before
/// acknowledging, the row becomes visible again once the lease runs out.
pub struct PostgresDispatchQueue {
    pool: PgPool,
    lease: Duration,
    poll_interval: Duration,
}

impl PostgresDispatchQueue {
    pub fn new(pool: PgPool, lease: Duration, poll_interval: Duration) -> Self {
        Self {
            pool,
            lease,
            poll_interval,
        }
    }

    async fn take(&self) -> Result<Option<Delivery>> {
        let row = sqlx::query(
            r#"
            UPDATE dispatch_messages
            SET locked_until = NOW() + make_interval(secs => $1)
            WHERE id = (
                SELECT id FROM dispatch_messages
                WHERE locked_until < NOW()
                ORDER BY id
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            RETURNING id, payload
            "#,
        )
        .bind(self.lease.as_secs_f64())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let payload: serde_json::Value = row.get("payload");
                Ok(Some(Delivery {
                    id: row.get("id"),
                    message: serde_json::from_value(payload)?,
                }))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl DispatchQueue for PostgresDispatchQueue {
    async fn publish(&self, message: DispatchMessage) -> Result<()> {
        sqlx::query("INSERT INTO dispatch_messages (kind, payload) VALUES ($1, $2)")
            .bind(message.kind())
            .bind(serde_json::to_value(&message)?)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn consume(&self) -> Result<Option<Delivery>> {
        loop {
            if let Some(delivery) = self.take().await? {
                return Ok(Some(delivery));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn ack(&self, delivery: &Delivery) -> Result<()> {
        sqlx::query("DELETE FROM dispatch_messages WHERE id = $1")
            .bind(delivery.id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn release(&self, delivery: &Delivery, delay: Duration) -> Result<()> {
        sqlx::query(
            "UPDATE dispatch_messages SET locked_until = NOW() + make_interval(secs => $1) WHERE id = $2",
        )
        .bind(delay.as_secs_f64())
        .bind(delivery.id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

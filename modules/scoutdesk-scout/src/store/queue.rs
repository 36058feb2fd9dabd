//! Postgres-backed work queue with visibility timeouts.
//!
//! `receive` claims rows with `FOR UPDATE SKIP LOCKED` and pushes their
//! `visible_at` forward, so concurrent consumers never claim the same message
//! and an unacknowledged message reappears once the timeout lapses.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use tracing::{debug, error};
use uuid::Uuid;

use scoutdesk_common::Result;

use crate::infra::retry::storage_error;
use crate::traits::{Delivery, ScoutMessage, WorkQueue};

#[derive(Clone)]
pub struct PgWorkQueue {
    pool: PgPool,
}

impl PgWorkQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WorkQueue for PgWorkQueue {
    async fn enqueue(&self, message: &ScoutMessage) -> Result<Uuid> {
        let id = Uuid::new_v4();
        sqlx::query("INSERT INTO scout_queue (id, payload) VALUES ($1, $2)")
            .bind(id)
            .bind(serde_json::to_value(message)?)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;

        debug!(message_id = %id, publication_id = %message.publication_id, trigger = message.trigger.as_str(), "Enqueued scout message");
        Ok(id)
    }

    async fn enqueue_batch(&self, messages: &[ScoutMessage]) -> Result<usize> {
        if messages.is_empty() {
            return Ok(0);
        }

        let payloads = messages
            .iter()
            .map(serde_json::to_value)
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new("INSERT INTO scout_queue (id, payload) ");
        builder.push_values(payloads, |mut row, payload| {
            row.push_bind(Uuid::new_v4()).push_bind(payload);
        });

        let result = builder
            .build()
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(result.rows_affected() as usize)
    }

    async fn receive(&self, max: u32, visibility: Duration) -> Result<Vec<Delivery>> {
        let rows = sqlx::query(
            "UPDATE scout_queue
             SET visible_at = now() + make_interval(secs => $2),
                 attempts = attempts + 1
             WHERE id IN (
                 SELECT id FROM scout_queue
                 WHERE visible_at <= now()
                 ORDER BY enqueued_at
                 LIMIT $1
                 FOR UPDATE SKIP LOCKED
             )
             RETURNING id, payload, attempts",
        )
        .bind(i64::from(max))
        .bind(visibility.as_secs_f64())
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        let mut deliveries = Vec::with_capacity(rows.len());
        for row in rows {
            let id: Uuid = row.try_get("id").map_err(storage_error)?;
            let payload: serde_json::Value = row.try_get("payload").map_err(storage_error)?;
            let attempts: i32 = row.try_get("attempts").map_err(storage_error)?;

            match serde_json::from_value::<ScoutMessage>(payload) {
                Ok(message) => deliveries.push(Delivery {
                    id,
                    message,
                    attempts: u32::try_from(attempts).unwrap_or(0),
                }),
                Err(e) => {
                    // Unreadable forever; drop it instead of redelivering.
                    error!(message_id = %id, error = %e, "Discarding unreadable scout message");
                    self.ack(id).await?;
                }
            }
        }
        Ok(deliveries)
    }

    async fn ack(&self, delivery_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM scout_queue WHERE id = $1")
            .bind(delivery_id)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(())
    }
}

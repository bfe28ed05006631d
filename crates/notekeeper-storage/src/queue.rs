//! PostgreSQL-backed message queue with visibility-timeout leases.
//!
//! Messages live in `message_queue`. Receiving a message pushes its
//! `visible_at` forward by the visibility timeout and rotates its pop
//! receipt, so a second receiver cannot see it until the lease runs out.
//! Deleting requires the receipt from the most recent receive.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row};
use tracing::{debug, warn};
use uuid::Uuid;

use notekeeper_core::{Error, Lease, LeasedMessage, MessageQueue, Result};

use crate::pool::{log_pool_metrics, map_transport_error};

/// PostgreSQL implementation of [`MessageQueue`] bound to one queue name.
#[derive(Clone)]
pub struct PgMessageQueue {
    pool: Pool<Postgres>,
    name: String,
}

impl PgMessageQueue {
    pub fn new(pool: Pool<Postgres>, name: impl Into<String>) -> Self {
        Self {
            pool,
            name: name.into(),
        }
    }

    fn parse_leased_row(row: sqlx::postgres::PgRow) -> LeasedMessage {
        LeasedMessage {
            lease: Lease {
                message_id: row.get("id"),
                pop_receipt: row.get("pop_receipt"),
            },
            body: row.get("body"),
            dequeue_count: row.get("dequeue_count"),
            inserted_at: row.get("inserted_at"),
            visible_until: row.get("visible_at"),
        }
    }
}

#[async_trait]
impl MessageQueue for PgMessageQueue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn enqueue(&self, body: &str) -> Result<Uuid> {
        let id = Uuid::now_v7();

        // Server clock, so ordering matches the visible_at comparisons in receive.
        sqlx::query(
            "INSERT INTO message_queue (id, queue_name, body, inserted_at, visible_at, dequeue_count)
             VALUES ($1, $2, $3, now(), now(), 0)",
        )
        .bind(id)
        .bind(&self.name)
        .bind(body)
        .execute(&self.pool)
        .await
        .map_err(map_transport_error)?;

        debug!(
            subsystem = "storage",
            component = "queue",
            op = "enqueue",
            queue = %self.name,
            message_id = %id,
            "Message enqueued"
        );
        Ok(id)
    }

    async fn receive(&self, visibility_timeout: Duration) -> Result<Option<LeasedMessage>> {
        let pop_receipt = Uuid::new_v4();
        let visibility_ms = visibility_timeout.as_millis() as i64;

        // SKIP LOCKED lets concurrent workers lease different messages.
        let row = sqlx::query(
            "UPDATE message_queue
             SET visible_at = now() + ($2::bigint * interval '1 millisecond'),
                 pop_receipt = $3,
                 dequeue_count = dequeue_count + 1
             WHERE id = (
                 SELECT id FROM message_queue
                 WHERE queue_name = $1
                   AND visible_at <= now()
                 ORDER BY inserted_at ASC
                 LIMIT 1
                 FOR UPDATE SKIP LOCKED
             )
             RETURNING id, body, pop_receipt, dequeue_count, inserted_at, visible_at",
        )
        .bind(&self.name)
        .bind(visibility_ms)
        .bind(pop_receipt)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            log_pool_metrics(&self.pool);
            map_transport_error(e)
        })?;

        Ok(row.map(Self::parse_leased_row))
    }

    async fn delete(&self, lease: &Lease) -> Result<()> {
        let result = sqlx::query(
            "DELETE FROM message_queue
             WHERE id = $1 AND pop_receipt = $2 AND queue_name = $3",
        )
        .bind(lease.message_id)
        .bind(lease.pop_receipt)
        .bind(&self.name)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::QueueDelete(e.to_string()))?;

        if result.rows_affected() == 0 {
            warn!(
                subsystem = "storage",
                component = "queue",
                op = "delete",
                queue = %self.name,
                message_id = %lease.message_id,
                "Delete matched no row; lease no longer current"
            );
            return Err(Error::QueueDelete(format!(
                "message {} is not held by pop receipt {}",
                lease.message_id, lease.pop_receipt
            )));
        }
        Ok(())
    }

    async fn len(&self) -> Result<u64> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM message_queue WHERE queue_name = $1")
                .bind(&self.name)
                .fetch_one(&self.pool)
                .await
                .map_err(map_transport_error)?;
        Ok(count.0.max(0) as u64)
    }
}

//! Lease-based queue over the `queue_messages` table.
//!
//! Visibility uses the database clock (`now()`), so every replica agrees
//! on lease expiry. Lease acquisition locks with `FOR UPDATE SKIP LOCKED`;
//! finish and extend are conditional on the caller's `dequeue_count` and
//! an unexpired lease, so only the current holder can settle a message.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use opentelemetry::KeyValue;

use crate::error::{Error, Result};
use crate::model::{Message, NewMessage};
use crate::queue::{DEFAULT_LEASE_DURATION, DequeueOptions, QueueClient, new_message_id};
use crate::telemetry::metrics;

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: String,
    dequeue_count: i32,
    enqueued_at: DateTime<Utc>,
    next_visible_at: DateTime<Utc>,
    content_type: String,
    data: Vec<u8>,
}

impl From<MessageRow> for Message {
    fn from(row: MessageRow) -> Self {
        Message {
            id: row.id,
            dequeue_count: row.dequeue_count.max(0) as u32,
            enqueued_at: row.enqueued_at,
            next_visible_at: row.next_visible_at,
            content_type: row.content_type,
            data: row.data,
        }
    }
}

impl super::Db {
    /// Insert a visible message. Returns its id.
    pub async fn enqueue_message(&self, queue_name: &str, message: NewMessage) -> Result<String> {
        message.validate()?;
        let id = new_message_id(queue_name);

        sqlx::query(
            "INSERT INTO queue_messages (id, queue_name, content_type, data)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(&id)
        .bind(queue_name)
        .bind(&message.content_type)
        .bind(&message.data)
        .execute(self.pool())
        .await?;

        Ok(id)
    }

    /// Lease the oldest visible message, if any.
    pub async fn dequeue_message(&self, queue_name: &str, lease: Duration) -> Result<Option<Message>> {
        let row: Option<MessageRow> = sqlx::query_as(
            "UPDATE queue_messages
             SET dequeue_count = dequeue_count + 1,
                 next_visible_at = now() + make_interval(secs => $2)
             WHERE id = (
                 SELECT id FROM queue_messages
                 WHERE queue_name = $1 AND next_visible_at <= now()
                 ORDER BY next_visible_at, enqueued_at
                 LIMIT 1
                 FOR UPDATE SKIP LOCKED
             )
             RETURNING id, dequeue_count, enqueued_at, next_visible_at, content_type, data",
        )
        .bind(queue_name)
        .bind(lease.as_secs_f64())
        .fetch_optional(self.pool())
        .await?;

        Ok(row.map(Message::from))
    }

    /// Delete a message under the caller's lease. Returns false if the
    /// lease is no longer current.
    pub async fn finish_leased_message(&self, queue_name: &str, message: &Message) -> Result<bool> {
        let affected = sqlx::query(
            "DELETE FROM queue_messages
             WHERE id = $1 AND queue_name = $2 AND dequeue_count = $3 AND next_visible_at > now()",
        )
        .bind(&message.id)
        .bind(queue_name)
        .bind(message.dequeue_count as i32)
        .execute(self.pool())
        .await?
        .rows_affected();

        Ok(affected > 0)
    }

    /// Slide the caller's lease forward from now. Returns the new
    /// visibility time, or `None` if the lease is no longer current.
    pub async fn extend_leased_message(
        &self,
        queue_name: &str,
        message: &Message,
        lease: Duration,
    ) -> Result<Option<DateTime<Utc>>> {
        let row: Option<(DateTime<Utc>,)> = sqlx::query_as(
            "UPDATE queue_messages
             SET next_visible_at = now() + make_interval(secs => $4)
             WHERE id = $1 AND queue_name = $2 AND dequeue_count = $3 AND next_visible_at > now()
             RETURNING next_visible_at",
        )
        .bind(&message.id)
        .bind(queue_name)
        .bind(message.dequeue_count as i32)
        .bind(lease.as_secs_f64())
        .fetch_optional(self.pool())
        .await?;

        Ok(row.map(|(at,)| at))
    }

    /// Messages in a queue, leased or not.
    pub async fn queue_depth(&self, queue_name: &str) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT count(*) FROM queue_messages WHERE queue_name = $1")
            .bind(queue_name)
            .fetch_one(self.pool())
            .await?;
        Ok(row.0)
    }
}

/// [`QueueClient`] for one named queue in Postgres.
#[derive(Clone)]
pub struct PostgresQueueClient {
    db: super::Db,
    name: String,
    lease_duration: Duration,
}

impl PostgresQueueClient {
    pub fn new(db: super::Db, name: impl Into<String>) -> Self {
        Self {
            db,
            name: name.into(),
            lease_duration: DEFAULT_LEASE_DURATION,
        }
    }

    pub fn with_lease_duration(mut self, lease_duration: Duration) -> Self {
        self.lease_duration = lease_duration;
        self
    }

    fn record<T>(&self, operation: &'static str, result: &Result<T>) {
        metrics::queue_operations().add(
            1,
            &[
                KeyValue::new("queue", self.name.clone()),
                KeyValue::new("operation", operation),
                KeyValue::new("result", metrics::result_label(result)),
            ],
        );
        if let Err(e) = result {
            if e.is_backend() {
                tracing::error!(queue = %self.name, operation = operation, error = %e, "queue backend error");
            }
        }
    }
}

#[async_trait]
impl QueueClient for PostgresQueueClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn enqueue(&self, message: NewMessage) -> Result<String> {
        let result = self.db.enqueue_message(&self.name, message).await;
        self.record("enqueue", &result);
        result
    }

    async fn dequeue(&self, options: &DequeueOptions) -> Result<Message> {
        let lease = options.lease_duration.unwrap_or(self.lease_duration);
        let result = self
            .db
            .dequeue_message(&self.name, lease)
            .await
            .and_then(|row| row.ok_or(Error::MessageNotFound));
        self.record("dequeue", &result);
        result
    }

    async fn finish_message(&self, message: &Message) -> Result<()> {
        message.ensure_issued()?;
        let result = match self.db.finish_leased_message(&self.name, message).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(Error::InvalidMessage),
            Err(e) => Err(e),
        };
        self.record("finish", &result);
        result
    }

    async fn extend_message(&self, message: &mut Message) -> Result<()> {
        message.ensure_issued()?;
        let result = self
            .db
            .extend_leased_message(&self.name, message, self.lease_duration)
            .await
            .and_then(|at| at.ok_or(Error::InvalidMessage));
        self.record("extend", &result);
        message.next_visible_at = result?;
        Ok(())
    }
}

//! In-memory queue backend.
//!
//! Visibility is tracked with `tokio::time::Instant`, so tests running on
//! a paused runtime can step through lease expiry deterministically. The
//! wall-clock timestamps on [`Message`] are derived from the same clock.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use opentelemetry::KeyValue;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::{Error, Result};
use crate::model::{Message, NewMessage};
use crate::queue::{DEFAULT_LEASE_DURATION, DequeueOptions, QueueClient, new_message_id};
use crate::telemetry::metrics;

#[derive(Debug, Clone, Copy)]
struct Clock {
    origin: Instant,
    origin_utc: DateTime<Utc>,
}

impl Clock {
    fn new() -> Self {
        Self {
            origin: Instant::now(),
            origin_utc: Utc::now(),
        }
    }

    fn to_utc(self, at: Instant) -> DateTime<Utc> {
        let elapsed = TimeDelta::from_std(at.saturating_duration_since(self.origin))
            .unwrap_or_else(|_| TimeDelta::zero());
        self.origin_utc + elapsed
    }
}

struct Slot {
    message: Message,
    visible_at: Instant,
}

pub struct MemoryQueueClient {
    name: String,
    lease_duration: Duration,
    clock: Clock,
    slots: Mutex<Vec<Slot>>,
}

impl MemoryQueueClient {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lease_duration: DEFAULT_LEASE_DURATION,
            clock: Clock::new(),
            slots: Mutex::new(Vec::new()),
        }
    }

    pub fn with_lease_duration(mut self, lease_duration: Duration) -> Self {
        self.lease_duration = lease_duration;
        self
    }

    /// Messages not yet finished, leased or not.
    pub async fn len(&self) -> usize {
        self.slots.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.slots.lock().await.is_empty()
    }

    fn record(&self, operation: &'static str, result: &str) {
        metrics::queue_operations().add(
            1,
            &[
                KeyValue::new("queue", self.name.clone()),
                KeyValue::new("operation", operation),
                KeyValue::new("result", result.to_string()),
            ],
        );
    }

    /// Locate the slot for the caller's current lease. Anything else
    /// (finished, re-leased, expired) is `InvalidMessage`.
    fn held_lease<'a>(slots: &'a mut [Slot], message: &Message, now: Instant) -> Result<&'a mut Slot> {
        slots
            .iter_mut()
            .find(|slot| slot.message.id == message.id)
            .filter(|slot| {
                slot.message.dequeue_count == message.dequeue_count && now < slot.visible_at
            })
            .ok_or(Error::InvalidMessage)
    }
}

#[async_trait]
impl QueueClient for MemoryQueueClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn enqueue(&self, message: NewMessage) -> Result<String> {
        message.validate()?;

        let now = Instant::now();
        let at = self.clock.to_utc(now);
        let id = new_message_id(&self.name);

        self.slots.lock().await.push(Slot {
            message: Message {
                id: id.clone(),
                dequeue_count: 0,
                enqueued_at: at,
                next_visible_at: at,
                content_type: message.content_type,
                data: message.data,
            },
            visible_at: now,
        });

        self.record("enqueue", "ok");
        tracing::debug!(queue = %self.name, message.id = %id, "enqueued");
        Ok(id)
    }

    async fn dequeue(&self, options: &DequeueOptions) -> Result<Message> {
        let lease = options.lease_duration.unwrap_or(self.lease_duration);
        let mut slots = self.slots.lock().await;
        let now = Instant::now();

        let Some(slot) = slots.iter_mut().find(|slot| slot.visible_at <= now) else {
            self.record("dequeue", "empty");
            return Err(Error::MessageNotFound);
        };

        slot.visible_at = now + lease;
        slot.message.dequeue_count += 1;
        slot.message.next_visible_at = self.clock.to_utc(slot.visible_at);

        self.record("dequeue", "ok");
        Ok(slot.message.clone())
    }

    async fn finish_message(&self, message: &Message) -> Result<()> {
        message.ensure_issued()?;

        let mut slots = self.slots.lock().await;
        let now = Instant::now();
        let result = Self::held_lease(&mut slots, message, now).map(|_| ());
        if result.is_ok() {
            slots.retain(|slot| slot.message.id != message.id);
        }

        self.record("finish", metrics::result_label(&result));
        result
    }

    async fn extend_message(&self, message: &mut Message) -> Result<()> {
        message.ensure_issued()?;

        let mut slots = self.slots.lock().await;
        let now = Instant::now();
        let result = Self::held_lease(&mut slots, message, now).map(|slot| {
            slot.visible_at = now + self.lease_duration;
            slot.message.next_visible_at = self.clock.to_utc(slot.visible_at);
            slot.message.next_visible_at
        });

        self.record("extend", metrics::result_label(&result));
        message.next_visible_at = result?;
        Ok(())
    }
}

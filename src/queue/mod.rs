//! Lease-based work queue.
//!
//! A message is visible until a consumer dequeues it, which takes a lease:
//! the message stays hidden until `next_visible_at` and its
//! `dequeue_count` is bumped. The holder either finishes it or extends the
//! lease; if it does neither the message becomes visible again and the
//! next dequeue takes a fresh lease. There is no explicit nack.

pub mod dequeuer;
pub mod memory;

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::error::Result;
use crate::model::{Message, NewMessage};

pub use dequeuer::{DequeuerOptions, start_dequeuer};
pub use memory::MemoryQueueClient;

/// Lease taken by `dequeue` and granted again by `extend_message`.
pub const DEFAULT_LEASE_DURATION: Duration = Duration::from_secs(5 * 60);

/// Options for a single dequeue.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DequeueOptions {
    /// Overrides the client's lease duration for this dequeue only.
    pub lease_duration: Option<Duration>,
}

impl DequeueOptions {
    pub fn with_lease(lease_duration: Duration) -> Self {
        Self {
            lease_duration: Some(lease_duration),
        }
    }
}

/// The queue contract.
///
/// A lease is identified by the message id together with the
/// `dequeue_count` it was issued under. Finish and extend succeed only
/// for the current, unexpired lease; any other handle gets
/// `InvalidMessage`. When two holders race, the first conditional write
/// wins and moves the lease on.
#[async_trait]
pub trait QueueClient: Send + Sync {
    /// Queue name, used for message ids and telemetry labels.
    fn name(&self) -> &str;

    /// Add a message, immediately visible. Returns the assigned id.
    async fn enqueue(&self, message: NewMessage) -> Result<String>;

    /// Lease one visible message. Fails `MessageNotFound` when there is
    /// none; this never waits.
    async fn dequeue(&self, options: &DequeueOptions) -> Result<Message>;

    /// Remove a leased message for good.
    async fn finish_message(&self, message: &Message) -> Result<()>;

    /// Push the lease forward by the client's lease duration, measured
    /// from now. Updates `message.next_visible_at` in place.
    async fn extend_message(&self, message: &mut Message) -> Result<()>;
}

/// `<queue>.<epoch seconds>.<random hex>`
pub(crate) fn new_message_id(queue: &str) -> String {
    format!(
        "{queue}.{}.{}",
        Utc::now().timestamp(),
        Uuid::new_v4().simple()
    )
}

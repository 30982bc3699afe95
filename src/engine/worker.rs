//! Worker pool: consumes a queue, runs handlers, keeps leases alive.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use opentelemetry::KeyValue;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, warn};

use crate::error::{Error, Result};
use crate::model::Message;
use crate::queue::{DEFAULT_LEASE_DURATION, DequeuerOptions, QueueClient, start_dequeuer};
use crate::telemetry::{metrics, spans};

pub const DEFAULT_MAX_OPERATION_CONCURRENCY: usize = 10;
pub const DEFAULT_MAX_OPERATION_RETRY_COUNT: u32 = 3;
pub const DEFAULT_EXTEND_MARGIN: Duration = Duration::from_secs(30);

/// How a handler settled a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Work is complete; the message is finished.
    Done,
    /// Leave the message for redelivery once its lease expires.
    Requeue,
}

impl Outcome {
    fn as_str(self) -> &'static str {
        match self {
            Outcome::Done => "done",
            Outcome::Requeue => "requeue",
        }
    }
}

/// Work performed for each dequeued message.
///
/// An error is treated like [`Outcome::Requeue`] and logged.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn handle(&self, message: &Message) -> anyhow::Result<Outcome>;
}

#[derive(Debug, Clone)]
pub struct WorkerOptions {
    /// Handlers running at once.
    pub max_operation_concurrency: usize,
    /// Messages dequeued more often than this are finished unhandled.
    pub max_operation_retry_count: u32,
    /// Lease granted by the queue on dequeue and on each extension.
    pub lease_duration: Duration,
    /// Extend once the lease has less than this left.
    pub extend_margin: Duration,
    pub dequeuer: DequeuerOptions,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            max_operation_concurrency: DEFAULT_MAX_OPERATION_CONCURRENCY,
            max_operation_retry_count: DEFAULT_MAX_OPERATION_RETRY_COUNT,
            lease_duration: DEFAULT_LEASE_DURATION,
            extend_margin: DEFAULT_EXTEND_MARGIN,
            dequeuer: DequeuerOptions::default(),
        }
    }
}

impl WorkerOptions {
    /// Time between lease extensions while a handler runs.
    fn renew_every(&self) -> Duration {
        self.lease_duration
            .saturating_sub(self.extend_margin)
            .max(Duration::from_millis(10))
    }
}

/// Pulls messages through a dequeuer and runs a [`Handler`] on each, at
/// most `max_operation_concurrency` at a time.
pub struct WorkerPool {
    queue: Arc<dyn QueueClient>,
    handler: Arc<dyn Handler>,
    options: WorkerOptions,
    shutdown: CancellationToken,
}

impl WorkerPool {
    pub fn new(queue: Arc<dyn QueueClient>, handler: Arc<dyn Handler>, options: WorkerOptions) -> Self {
        Self {
            queue,
            handler,
            options,
            shutdown: CancellationToken::new(),
        }
    }

    /// Stop taking new messages. `run` returns once in-flight handlers end.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Token that stops the pool when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run until shutdown.
    pub async fn run(&self) -> Result<()> {
        let mut messages = start_dequeuer(
            Arc::clone(&self.queue),
            self.options.dequeuer.clone(),
            self.shutdown.child_token(),
        );
        let permits = Arc::new(Semaphore::new(self.options.max_operation_concurrency.max(1)));
        let mut tasks = JoinSet::new();

        info!(
            queue = %self.queue.name(),
            max_concurrency = self.options.max_operation_concurrency,
            "worker pool started"
        );

        loop {
            // The permit bounds running handlers only. While all of them
            // are busy, up to `buffer` leased messages wait in the channel
            // plus one in the dequeuer's pending send. Their leases are not
            // renewed and may lapse, in which case the message is
            // redelivered and the stale copy fails to finish.
            let permit = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                permit = Arc::clone(&permits).acquire_owned() => {
                    permit.map_err(|_| Error::Other("worker permits closed".to_string()))?
                }
            };

            let message = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                message = messages.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
            };

            let queue = Arc::clone(&self.queue);
            let handler = Arc::clone(&self.handler);
            let options = self.options.clone();
            tasks.spawn(async move {
                process_message(queue, handler, &options, message).await;
                drop(permit);
            });

            while let Some(joined) = tasks.try_join_next() {
                if let Err(e) = joined {
                    error!(error = %e, "worker task panicked");
                }
            }
        }

        info!(in_flight = tasks.len(), "worker pool stopping");
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "worker task panicked");
            }
        }
        info!("worker pool stopped");
        Ok(())
    }
}

fn record_outcome(queue: &str, outcome: &'static str) {
    metrics::worker_messages().add(
        1,
        &[
            KeyValue::new("queue", queue.to_string()),
            KeyValue::new("outcome", outcome),
        ],
    );
}

async fn process_message(
    queue: Arc<dyn QueueClient>,
    handler: Arc<dyn Handler>,
    options: &WorkerOptions,
    mut message: Message,
) {
    let span = spans::message_span(queue.name(), &message.id, message.dequeue_count);

    async {
        if message.dequeue_count > options.max_operation_retry_count {
            warn!(
                dequeue_count = message.dequeue_count,
                max_retry = options.max_operation_retry_count,
                "retry count exceeded, abandoning message"
            );
            if let Err(e) = queue.finish_message(&message).await {
                warn!(error = %e, "failed to finish abandoned message");
            }
            spans::record_outcome(&tracing::Span::current(), "abandoned");
            record_outcome(queue.name(), "abandoned");
            return;
        }

        let started = Instant::now();
        let snapshot = message.clone();
        let work = handler.handle(&snapshot);
        tokio::pin!(work);

        let renew_every = options.renew_every();
        let mut renew = tokio::time::interval_at(started + renew_every, renew_every);
        renew.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let result = loop {
            tokio::select! {
                result = &mut work => break result,
                _ = renew.tick() => match queue.extend_message(&mut message).await {
                    Ok(()) => debug!(next_visible_at = %message.next_visible_at, "lease extended"),
                    Err(e) => warn!(error = %e, "failed to extend lease"),
                },
            }
        };

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        metrics::operation_duration_ms()
            .record(elapsed_ms, &[KeyValue::new("operation", "worker.handle")]);

        let outcome = match result {
            Ok(Outcome::Done) => match queue.finish_message(&message).await {
                Ok(()) => Outcome::Done.as_str(),
                Err(Error::InvalidMessage) => {
                    warn!("lease lost before the message could be finished");
                    "lease_lost"
                }
                Err(e) => {
                    error!(error = %e, "failed to finish message");
                    "failed"
                }
            },
            Ok(Outcome::Requeue) => Outcome::Requeue.as_str(),
            Err(e) => {
                error!(error = %e, "handler failed");
                "failed"
            }
        };

        spans::record_outcome(&tracing::Span::current(), outcome);
        record_outcome(queue.name(), outcome);
    }
    .instrument(span)
    .await
}

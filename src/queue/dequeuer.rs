//! Fixed-interval polling loop that turns `dequeue` into a stream.

use std::sync::Arc;
use std::time::Duration;

use opentelemetry::KeyValue;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::Error;
use crate::model::Message;
use crate::queue::{DequeueOptions, QueueClient};
use crate::telemetry::metrics;

/// Wait between polls.
pub const DEFAULT_DEQUEUE_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Clone)]
pub struct DequeuerOptions {
    pub interval: Duration,
    pub dequeue: DequeueOptions,
    /// Channel capacity. A full channel stops polling until the consumer
    /// catches up.
    pub buffer: usize,
}

impl Default for DequeuerOptions {
    fn default() -> Self {
        Self {
            interval: DEFAULT_DEQUEUE_INTERVAL,
            dequeue: DequeueOptions::default(),
            buffer: 1,
        }
    }
}

fn record_poll(queue: &str, result: &'static str) {
    metrics::dequeuer_polls().add(
        1,
        &[
            KeyValue::new("queue", queue.to_string()),
            KeyValue::new("result", result),
        ],
    );
}

/// Spawn the polling task and return its output channel.
///
/// The task calls `dequeue` once per interval and delivers whatever it
/// leases. `MessageNotFound` and backend errors just wait for the next
/// tick. The channel closes when `cancel` fires or the receiver is dropped.
pub fn start_dequeuer(
    client: Arc<dyn QueueClient>,
    options: DequeuerOptions,
    cancel: CancellationToken,
) -> mpsc::Receiver<Message> {
    let (tx, rx) = mpsc::channel(options.buffer.max(1));

    tokio::spawn(async move {
        let queue = client.name().to_string();
        tracing::debug!(queue = %queue, interval_ms = options.interval.as_millis() as u64, "dequeuer started");

        loop {
            let polled = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                polled = client.dequeue(&options.dequeue) => polled,
            };

            match polled {
                Ok(message) => {
                    record_poll(&queue, "delivered");
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        sent = tx.send(message) => {
                            if sent.is_err() {
                                break;
                            }
                        }
                    }
                }
                Err(Error::MessageNotFound) => record_poll(&queue, "empty"),
                Err(e) => {
                    record_poll(&queue, "error");
                    tracing::warn!(queue = %queue, error = %e, "failed to dequeue message");
                }
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tx.closed() => break,
                _ = tokio::time::sleep(options.interval) => {}
            }
        }

        tracing::debug!(queue = %queue, "dequeuer stopped");
    });

    rx
}

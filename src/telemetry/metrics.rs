//! Metric instrument factories for controlplane-store.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"controlplane-store"` meter.

use opentelemetry::metrics::{Counter, Histogram, Meter};

fn meter() -> Meter {
    opentelemetry::global::meter("controlplane-store")
}

/// Counter: storage client operations.
/// Labels: `backend`, `operation` ("get" | "save" | "delete" | "query"),
/// `result` ("ok" | "not_found" | "conflict" | "error").
pub fn storage_operations() -> Counter<u64> {
    meter()
        .u64_counter("controlplane.storage.operations")
        .with_description("Number of storage client operations")
        .build()
}

/// Counter: queue client operations.
/// Labels: `queue`, `operation` ("enqueue" | "dequeue" | "dequeue_empty" |
/// "finish" | "extend"), `result`.
pub fn queue_operations() -> Counter<u64> {
    meter()
        .u64_counter("controlplane.queue.operations")
        .with_description("Number of queue client operations")
        .build()
}

/// Counter: dequeuer poll attempts.
/// Labels: `queue`, `result` ("delivered" | "empty" | "error").
pub fn dequeuer_polls() -> Counter<u64> {
    meter()
        .u64_counter("controlplane.dequeuer.polls")
        .with_description("Number of dequeuer poll attempts")
        .build()
}

/// Counter: messages handled by the worker pool.
/// Labels: `queue`, `outcome` ("done" | "requeue" | "failed" | "abandoned").
pub fn worker_messages() -> Counter<u64> {
    meter()
        .u64_counter("controlplane.worker.messages")
        .with_description("Number of messages handled by the worker pool")
        .build()
}

/// Histogram: operation duration in milliseconds.
/// Labels: `operation`.
pub fn operation_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("controlplane.operation.duration_ms")
        .with_description("Operation duration in milliseconds")
        .with_unit("ms")
        .build()
}

/// Label value for an operation result.
pub fn result_label<T>(result: &crate::error::Result<T>) -> &'static str {
    use crate::error::Error;
    match result {
        Ok(_) => "ok",
        Err(Error::NotFound(_)) => "not_found",
        Err(Error::ConcurrencyConflict) => "conflict",
        Err(Error::MessageNotFound) => "empty",
        Err(Error::InvalidMessage) => "invalid_lease",
        Err(_) => "error",
    }
}

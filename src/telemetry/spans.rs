//! Span helpers for storage and queue operations.

use tracing::Span;

use crate::resources::ResourceId;

/// Span for a single storage client call.
pub fn storage_span(backend: &'static str, operation: &'static str, id: &ResourceId) -> Span {
    tracing::info_span!(
        "storage.operation",
        "storage.backend" = backend,
        "storage.operation" = operation,
        "resource.id" = %id,
    )
}

/// Span for a storage query. `storage.results` is filled in when the
/// query completes.
pub fn query_span(backend: &'static str, root_scope: &ResourceId, is_scope_query: bool) -> Span {
    tracing::info_span!(
        "storage.query",
        "storage.backend" = backend,
        "query.root_scope" = %root_scope,
        "query.scopes" = is_scope_query,
        "storage.results" = tracing::field::Empty,
    )
}

/// Span for handling one dequeued message in the worker pool.
/// `message.outcome` is recorded by [`record_outcome`].
pub fn message_span(queue: &str, message_id: &str, dequeue_count: u32) -> Span {
    tracing::info_span!(
        "queue.message",
        "queue.name" = queue,
        "message.id" = message_id,
        "message.dequeue_count" = dequeue_count,
        "message.outcome" = tracing::field::Empty,
    )
}

/// Record how a message was settled on its span.
pub fn record_outcome(span: &Span, outcome: &str) {
    span.record("message.outcome", outcome);
    span.in_scope(|| {
        tracing::debug!(outcome = outcome, "message_settled");
    });
}

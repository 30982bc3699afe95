//! Integration tests for telemetry initialization and span helpers.

use controlplane_store::resources::ResourceId;
use controlplane_store::telemetry::{self, TelemetryConfig, metrics, spans};

#[test]
fn telemetry_initializes_without_endpoint() {
    // The global subscriber can only be set once per process; a second
    // init in the same binary may fail and that is acceptable here.
    let config = TelemetryConfig {
        endpoint: None,
        service_name: "controlplane-store-test".to_string(),
        log_level: "debug".to_string(),
    };
    let _guard = telemetry::init_telemetry(config);
}

#[test]
fn storage_spans_create() {
    let id = ResourceId::parse("/planes/radius/local/resourceGroups/rg").unwrap();
    let span = spans::storage_span("memory", "get", &id);
    spans::record_outcome(&span, "ok");

    let span = spans::query_span("memory", &id, true);
    span.record("storage.results", 3u64);
}

#[test]
fn message_span_records_outcome() {
    let span = spans::message_span("controlplane", "controlplane.1700000000.abc", 2);
    spans::record_outcome(&span, "done");
}

#[test]
fn instruments_accept_measurements() {
    metrics::storage_operations().add(1, &[]);
    metrics::queue_operations().add(1, &[]);
    metrics::dequeuer_polls().add(1, &[]);
    metrics::worker_messages().add(1, &[]);
    metrics::operation_duration_ms().record(1.5, &[]);
}

#[test]
fn result_labels() {
    use controlplane_store::Error;

    let ok: controlplane_store::Result<()> = Ok(());
    assert_eq!(metrics::result_label(&ok), "ok");

    let empty: controlplane_store::Result<()> = Err(Error::MessageNotFound);
    assert_ne!(metrics::result_label(&empty), "error");
}

//! Logging, tracing and metrics setup.
//!
//! Without an OTLP endpoint everything goes to stderr through
//! `tracing-subscriber`. With one, spans, metrics and log events are also
//! exported over gRPC. Store and queue operations emit spans from
//! [`spans`] and count themselves in [`metrics`].

pub mod metrics;
pub mod spans;

use opentelemetry_sdk::Resource;
use opentelemetry_sdk::logs::SdkLoggerProvider;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::trace::SdkTracerProvider;

use crate::error::{Error, Result};

pub struct TelemetryConfig {
    /// OTLP gRPC endpoint, e.g. `http://localhost:4317`. `None` keeps
    /// output local.
    pub endpoint: Option<String>,
    pub service_name: String,
    /// Filter directive used when `RUST_LOG` is unset
    /// (`info`, `controlplane_store=debug`, ...).
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            service_name: "controlplane-store".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Keeps the export pipelines alive. Dropping it flushes and shuts them
/// down, so hold it until the process exits.
#[derive(Default)]
pub struct TelemetryGuard {
    pipelines: Option<Pipelines>,
}

struct Pipelines {
    traces: SdkTracerProvider,
    metrics: SdkMeterProvider,
    logs: SdkLoggerProvider,
}

impl TelemetryGuard {
    /// Push out anything buffered without shutting down.
    pub fn force_flush(&self) {
        if let Some(p) = &self.pipelines {
            let _ = p.traces.force_flush();
            let _ = p.metrics.force_flush();
            let _ = p.logs.force_flush();
        }
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(p) = self.pipelines.take() {
            let _ = p.logs.shutdown();
            let _ = p.metrics.shutdown();
            let _ = p.traces.shutdown();
        }
    }
}

fn exporter_error(signal: &str, e: impl std::fmt::Display) -> Error {
    Error::Other(format!("failed to build OTLP {signal} exporter: {e}"))
}

fn build_pipelines(endpoint: &str, service_name: &str) -> Result<Pipelines> {
    use opentelemetry_otlp::{LogExporter, MetricExporter, SpanExporter, WithExportConfig as _};

    let resource = Resource::builder()
        .with_service_name(service_name.to_string())
        .build();

    let spans = SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| exporter_error("span", e))?;
    let traces = SdkTracerProvider::builder()
        .with_batch_exporter(spans)
        .with_resource(resource.clone())
        .build();

    let measurements = MetricExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| exporter_error("metric", e))?;
    let metrics = SdkMeterProvider::builder()
        .with_periodic_exporter(measurements)
        .with_resource(resource.clone())
        .build();

    let records = LogExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| exporter_error("log", e))?;
    let logs = SdkLoggerProvider::builder()
        .with_batch_exporter(records)
        .with_resource(resource)
        .build();

    Ok(Pipelines {
        traces,
        metrics,
        logs,
    })
}

/// Install the global subscriber (and meter provider, when exporting).
///
/// # Errors
///
/// Fails if an exporter cannot be built or a global subscriber is
/// already installed.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard> {
    use opentelemetry::trace::TracerProvider as _;
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::layer::SubscriberExt as _;
    use tracing_subscriber::util::SubscriberInitExt as _;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let subscriber_error = |e: tracing_subscriber::util::TryInitError| {
        Error::Other(format!("failed to install tracing subscriber: {e}"))
    };

    let Some(endpoint) = config.endpoint.as_deref() else {
        // stdout stays free for CLI output.
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
            .map_err(subscriber_error)?;
        return Ok(TelemetryGuard::default());
    };

    let pipelines = build_pipelines(endpoint, &config.service_name)?;
    opentelemetry::global::set_meter_provider(pipelines.metrics.clone());

    let tracer = pipelines.traces.tracer(config.service_name.clone());
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_writer(std::io::stderr),
        )
        .with(tracing_opentelemetry::layer().with_tracer(tracer))
        .with(opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge::new(
            &pipelines.logs,
        ))
        .try_init()
        .map_err(subscriber_error)?;

    tracing::debug!(endpoint, service = %config.service_name, "otlp export enabled");
    Ok(TelemetryGuard {
        pipelines: Some(pipelines),
    })
}

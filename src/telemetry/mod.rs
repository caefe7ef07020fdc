//! Logs, traces and metrics.
//!
//! [`init_telemetry`] always installs a `tracing` fmt layer filtered by
//! `RUST_LOG`, falling back to the configured level. With an OTLP endpoint
//! it also exports the job spans from [`job`], the `deferq.*` instruments
//! from [`metrics`] and log records, all tagged with the same resource.

pub mod job;
pub mod metrics;

use opentelemetry::KeyValue;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;
use opentelemetry_otlp::WithExportConfig as _;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::logs::SdkLoggerProvider;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::trace::SdkTracerProvider;
use opentelemetry_semantic_conventions::resource::SERVICE_VERSION;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

use crate::config::Config;
use crate::error::{Error, Result};

/// Resource attribute naming the pgmq queue a process submits to or works.
pub const QUEUE_ATTRIBUTE: &str = "deferq.queue";

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// OTLP gRPC endpoint (e.g. "http://localhost:4317"). `None` means fmt
    /// output only.
    pub endpoint: Option<String>,
    pub service_name: String,
    /// Filter directive used when `RUST_LOG` is unset (e.g. "info",
    /// "deferq=debug").
    pub log_level: String,
    pub queue_name: Option<String>,
}

impl TelemetryConfig {
    /// Local fmt output only, at `info`.
    pub fn local(service_name: impl Into<String>) -> Self {
        Self {
            endpoint: None,
            service_name: service_name.into(),
            log_level: "info".to_string(),
            queue_name: None,
        }
    }

    /// Settings for a deferq process running against `config`.
    pub fn from_config(config: &Config) -> Self {
        Self {
            endpoint: config.otel_endpoint.clone(),
            service_name: "deferq".to_string(),
            log_level: config.log_level.clone(),
            queue_name: Some(config.queue_name.clone()),
        }
    }

    /// Resource shared by traces, metrics and logs.
    pub fn resource(&self) -> Resource {
        let mut attributes = vec![KeyValue::new(SERVICE_VERSION, env!("CARGO_PKG_VERSION"))];
        if let Some(queue) = &self.queue_name {
            attributes.push(KeyValue::new(QUEUE_ATTRIBUTE, queue.clone()));
        }
        Resource::builder()
            .with_service_name(self.service_name.clone())
            .with_attributes(attributes)
            .build()
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.log_level))
    }
}

/// Flushes and shuts down the OTLP pipelines when dropped. Hold it for the
/// life of the process.
pub struct TelemetryGuard {
    exporters: Option<Exporters>,
}

impl TelemetryGuard {
    /// Whether signals leave the process.
    pub fn is_exporting(&self) -> bool {
        self.exporters.is_some()
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(exporters) = self.exporters.take() {
            exporters.shutdown();
        }
    }
}

struct Exporters {
    tracer: SdkTracerProvider,
    meter: SdkMeterProvider,
    logger: SdkLoggerProvider,
}

impl Exporters {
    fn build(endpoint: &str, resource: Resource) -> Result<Self> {
        let spans = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint)
            .build()
            .map_err(exporter_error("span"))?;
        let metrics = opentelemetry_otlp::MetricExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint)
            .build()
            .map_err(exporter_error("metric"))?;
        let logs = opentelemetry_otlp::LogExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint)
            .build()
            .map_err(exporter_error("log"))?;

        Ok(Self {
            tracer: SdkTracerProvider::builder()
                .with_batch_exporter(spans)
                .with_resource(resource.clone())
                .build(),
            meter: SdkMeterProvider::builder()
                .with_periodic_exporter(metrics)
                .with_resource(resource.clone())
                .build(),
            logger: SdkLoggerProvider::builder()
                .with_batch_exporter(logs)
                .with_resource(resource)
                .build(),
        })
    }

    // Logs first, so records emitted while the others stop still go out.
    fn shutdown(self) {
        if let Err(e) = self.logger.shutdown() {
            eprintln!("deferq: log exporter shutdown failed: {e}");
        }
        if let Err(e) = self.meter.shutdown() {
            eprintln!("deferq: metric exporter shutdown failed: {e}");
        }
        if let Err(e) = self.tracer.shutdown() {
            eprintln!("deferq: span exporter shutdown failed: {e}");
        }
    }
}

fn exporter_error<E: std::fmt::Display>(signal: &'static str) -> impl FnOnce(E) -> Error {
    move |e| Error::Other(format!("failed to build OTLP {signal} exporter: {e}"))
}

fn subscriber_error(e: impl std::fmt::Display) -> Error {
    Error::Other(format!("failed to init tracing subscriber: {e}"))
}

/// Install the global subscriber and, with an endpoint, the OTLP pipelines.
///
/// # Errors
///
/// Fails if an exporter cannot be built or a global subscriber is already
/// set (as happens when several tests initialize telemetry).
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard> {
    let registry = tracing_subscriber::registry().with(config.filter());

    let Some(endpoint) = config.endpoint.as_deref() else {
        registry
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .map_err(subscriber_error)?;
        return Ok(TelemetryGuard { exporters: None });
    };

    let exporters = Exporters::build(endpoint, config.resource())?;
    opentelemetry::global::set_meter_provider(exporters.meter.clone());

    registry
        .with(tracing_subscriber::fmt::layer().compact())
        .with(tracing_opentelemetry::layer().with_tracer(exporters.tracer.tracer("deferq")))
        .with(OpenTelemetryTracingBridge::new(&exporters.logger))
        .try_init()
        .map_err(subscriber_error)?;

    Ok(TelemetryGuard {
        exporters: Some(exporters),
    })
}

//! Telemetry Provider Setup
//!
//! Builds the trace, metric and log providers. With export enabled each
//! signal ships to the collector over OTLP/gRPC; otherwise the providers
//! have no exporters and telemetry stays in-process.

use opentelemetry::metrics::{Meter, MeterProvider as _};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::logs::LoggerProvider;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::trace::{Tracer, TracerProvider};
use opentelemetry_sdk::{runtime, Resource};
use log::{debug, info};
use thiserror::Error;

use crate::config::TelemetryConfig;

/// Instrumentation scope of pipeline spans.
pub const TRACER_NAME: &str = "etl-tracer";

/// Instrumentation scope of resource gauges.
pub const METER_NAME: &str = "etl-metrics";

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Failed to build {signal} exporter: {message}")]
    Exporter {
        signal: &'static str,
        message: String,
    },
    #[error("Failed to install logger: {0}")]
    Logger(#[from] log::SetLoggerError),
    #[error("Telemetry shutdown failed: {0}")]
    Shutdown(String),
}

/// The installed trace, metric and log providers.
///
/// Call [`shutdown`](Self::shutdown) before exit to flush buffered spans,
/// log records and a final metric collection.
pub struct Telemetry {
    tracer_provider: TracerProvider,
    meter_provider: SdkMeterProvider,
    logger_provider: LoggerProvider,
    exporting: bool,
}

impl Telemetry {
    /// Builds the providers and installs the tracer and meter providers
    /// globally.
    ///
    /// Must be called from within a tokio runtime when export is enabled;
    /// the batch processors and the periodic reader run on it.
    pub fn init(config: &TelemetryConfig) -> Result<Self, TelemetryError> {
        let telemetry = if config.enabled {
            Self::with_otlp(config)?
        } else {
            Self::in_process(config)
        };

        global::set_tracer_provider(telemetry.tracer_provider.clone());
        global::set_meter_provider(telemetry.meter_provider.clone());

        Ok(telemetry)
    }

    /// Providers exporting every signal to the configured collector.
    fn with_otlp(config: &TelemetryConfig) -> Result<Self, TelemetryError> {
        let resource = build_resource(config);

        let span_exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_endpoint(config.endpoint.clone())
            .with_timeout(config.timeout())
            .build()
            .map_err(|e| exporter_error("span", e))?;

        let metric_exporter = opentelemetry_otlp::MetricExporter::builder()
            .with_tonic()
            .with_endpoint(config.endpoint.clone())
            .with_timeout(config.timeout())
            .build()
            .map_err(|e| exporter_error("metric", e))?;

        let log_exporter = opentelemetry_otlp::LogExporter::builder()
            .with_tonic()
            .with_endpoint(config.endpoint.clone())
            .with_timeout(config.timeout())
            .build()
            .map_err(|e| exporter_error("log", e))?;

        let tracer_provider = TracerProvider::builder()
            .with_batch_exporter(span_exporter, runtime::Tokio)
            .with_resource(resource.clone())
            .build();

        let reader = PeriodicReader::builder(metric_exporter, runtime::Tokio)
            .with_interval(config.export_interval())
            .build();

        let meter_provider = SdkMeterProvider::builder()
            .with_reader(reader)
            .with_resource(resource.clone())
            .build();

        let logger_provider = LoggerProvider::builder()
            .with_batch_exporter(log_exporter, runtime::Tokio)
            .with_resource(resource)
            .build();

        info!(
            "Exporting telemetry to {} (metrics every {} ms)",
            config.endpoint, config.export_interval_ms
        );

        Ok(Self {
            tracer_provider,
            meter_provider,
            logger_provider,
            exporting: true,
        })
    }

    /// Providers with no exporters. Spans still get real ids.
    fn in_process(config: &TelemetryConfig) -> Self {
        let resource = build_resource(config);

        debug!("Telemetry export disabled");

        Self {
            tracer_provider: TracerProvider::builder()
                .with_resource(resource.clone())
                .build(),
            meter_provider: SdkMeterProvider::builder()
                .with_resource(resource.clone())
                .build(),
            logger_provider: LoggerProvider::builder().with_resource(resource).build(),
            exporting: false,
        }
    }

    /// Tracer for pipeline spans.
    pub fn tracer(&self) -> Tracer {
        self.tracer_provider.tracer(TRACER_NAME)
    }

    /// Meter for resource gauges.
    pub fn meter(&self) -> Meter {
        self.meter_provider.meter(METER_NAME)
    }

    /// Provider that the log bridge emits records through.
    pub fn logger_provider(&self) -> &LoggerProvider {
        &self.logger_provider
    }

    /// Returns true when telemetry is shipped to a collector.
    pub fn is_exporting(&self) -> bool {
        self.exporting
    }

    /// Flushes and shuts down every provider.
    ///
    /// All three providers are shut down even if one fails; the errors are
    /// reported together.
    pub fn shutdown(self) -> Result<(), TelemetryError> {
        let mut failures = Vec::new();

        if let Err(e) = self.tracer_provider.shutdown() {
            failures.push(format!("traces: {}", e));
        }
        if let Err(e) = self.meter_provider.shutdown() {
            failures.push(format!("metrics: {}", e));
        }
        if let Err(e) = self.logger_provider.shutdown() {
            failures.push(format!("logs: {}", e));
        }

        if failures.is_empty() {
            debug!("Telemetry providers shut down");
            Ok(())
        } else {
            Err(TelemetryError::Shutdown(failures.join("; ")))
        }
    }
}

fn build_resource(config: &TelemetryConfig) -> Resource {
    Resource::new(vec![
        KeyValue::new("service.name", config.service_name.clone()),
        KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
    ])
}

fn exporter_error(signal: &'static str, e: impl std::fmt::Display) -> TelemetryError {
    TelemetryError::Exporter {
        signal,
        message: e.to_string(),
    }
}

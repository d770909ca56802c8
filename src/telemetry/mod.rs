//! Telemetry Module
//!
//! Wires the OpenTelemetry trace, metric and log pipelines.
//!
//! # Components
//!
//! - [`exporter`]: provider construction, OTLP export and shutdown
//! - [`logging`]: console logger fanned out to the OTel log bridge

pub mod exporter;
pub mod logging;

pub use exporter::{Telemetry, TelemetryError, METER_NAME, TRACER_NAME};
pub use logging::{init_logging, FanoutLogger, LogForwarder, FORWARD_LEVEL};

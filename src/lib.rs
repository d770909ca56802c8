//! PipeTrace - Instrumented ETL Pipeline Simulator
//!
//! Runs a synthetic extract/transform/load pipeline while emitting traces,
//! logs and resource-usage metrics through OpenTelemetry. Resource gauges
//! are tagged with the id of the span enclosing the run, so metric samples
//! can be joined to the trace they were taken under.
//!
//! # Architecture
//!
//! The library is organized into five modules:
//!
//! - [`workload`]: CPU burn and idle delay primitives
//! - [`monitoring`]: Resource sampling, span-scoped gauges and stage timeline
//! - [`execution`]: Pipeline runner, stages and run state
//! - [`telemetry`]: OTLP providers and logging
//! - [`config`]: Defaults, YAML file and environment overrides
//!
//! # Example
//!
//! ```rust,no_run
//! use pipetrace::config::Config;
//! use pipetrace::execution::PipelineRunner;
//! use pipetrace::monitoring::{ResourceGauges, ResourceSampler, ScopedSampler, SpanScope};
//! use pipetrace::telemetry::Telemetry;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let telemetry = Telemetry::init(&config.telemetry)?;
//!
//!     // Gauges read the correlation id from the scope at sample time
//!     let scope = SpanScope::new();
//!     let sampler = ScopedSampler::new(ResourceSampler::new()?, scope.clone());
//!     let _gauges = ResourceGauges::register(&telemetry.meter(), sampler);
//!
//!     let mut runner = PipelineRunner::new(telemetry.tracer(), scope);
//!     let report = tokio::task::spawn_blocking(move || runner.run()).await??;
//!     println!("{}", report.summary());
//!
//!     tokio::task::spawn_blocking(move || telemetry.shutdown()).await??;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod execution;
pub mod monitoring;
pub mod telemetry;
pub mod workload;

// Re-export commonly used types
pub use config::Config;
pub use execution::{PipelineRunner, RunReport};
pub use monitoring::{CorrelationId, SpanScope};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "PipeTrace";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_version() {
        assert!(!VERSION.is_empty());
        assert!(VERSION.contains('.'));
    }

    #[test]
    fn test_app_name() {
        assert_eq!(APP_NAME, "PipeTrace");
    }

    #[test]
    fn test_module_exports_scope() {
        let scope = SpanScope::new();
        scope.rebind(CorrelationId::new("exported"));
        assert_eq!(scope.current().as_str(), "exported");
    }

    #[test]
    fn test_module_exports_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_version_format() {
        let parts: Vec<&str> = VERSION.split('.').collect();
        assert!(parts.len() >= 2, "Version should have at least major.minor");
        for part in parts {
            assert!(part.parse::<u32>().is_ok(), "Version components should be numeric");
        }
    }
}

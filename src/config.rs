//! Runtime Configuration
//!
//! Settings come from four layers, later ones winning:
//! built-in defaults, an optional YAML file, standard `OTEL_*`
//! environment variables, and command-line flags.
//!
//! # Example YAML Format
//!
//! ```yaml
//! telemetry:
//!   service_name: etl-pipeline
//!   endpoint: http://collector:4317
//!   export_interval_ms: 1000
//! pipeline:
//!   extract_seconds: 4
//!   transform_seconds: 4
//!   load_min_seconds: 1
//!   load_max_seconds: 2
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, info};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::execution::PipelinePlan;

pub const ENV_ENDPOINT: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";
pub const ENV_SERVICE_NAME: &str = "OTEL_SERVICE_NAME";
pub const ENV_EXPORT_INTERVAL: &str = "OTEL_METRIC_EXPORT_INTERVAL";
pub const ENV_SDK_DISABLED: &str = "OTEL_SDK_DISABLED";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// OTLP export settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Export to the collector; when false, telemetry stays in-process
    pub enabled: bool,
    /// `service.name` resource attribute
    pub service_name: String,
    /// Collector gRPC endpoint
    pub endpoint: String,
    /// Interval between metric collections
    pub export_interval_ms: u64,
    /// Per-export timeout
    pub timeout_seconds: u64,
    /// Window over which CPU utilization is measured per sample
    pub cpu_window_ms: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            service_name: "etl-pipeline".to_string(),
            endpoint: "http://localhost:4317".to_string(),
            export_interval_ms: 1000,
            timeout_seconds: 10,
            cpu_window_ms: 500,
        }
    }
}

impl TelemetryConfig {
    pub fn export_interval(&self) -> Duration {
        Duration::from_millis(self.export_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn cpu_window(&self) -> Duration {
        Duration::from_millis(self.cpu_window_ms)
    }
}

/// Complete application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub telemetry: TelemetryConfig,
    pub pipeline: PipelinePlan,
}

impl Config {
    /// Loads configuration from a YAML file. Missing keys keep their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let config = Self::from_yaml(&content)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parses configuration from YAML text.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    /// Applies overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Applies overrides using `lookup` to resolve variables.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(endpoint) = lookup(ENV_ENDPOINT).filter(|v| !v.trim().is_empty()) {
            debug!("{} overrides endpoint", ENV_ENDPOINT);
            self.telemetry.endpoint = endpoint.trim().to_string();
        }

        if let Some(name) = lookup(ENV_SERVICE_NAME).filter(|v| !v.trim().is_empty()) {
            self.telemetry.service_name = name.trim().to_string();
        }

        if let Some(interval) = lookup(ENV_EXPORT_INTERVAL) {
            self.telemetry.export_interval_ms = interval.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!("{} is not a number: {}", ENV_EXPORT_INTERVAL, interval))
            })?;
        }

        if let Some(disabled) = lookup(ENV_SDK_DISABLED) {
            if disabled.trim().eq_ignore_ascii_case("true") {
                self.telemetry.enabled = false;
            }
        }

        Ok(())
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.telemetry.export_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "export_interval_ms must be greater than zero".to_string(),
            ));
        }

        if self.telemetry.enabled && self.telemetry.endpoint.trim().is_empty() {
            return Err(ConfigError::Invalid("endpoint must not be empty".to_string()));
        }

        self.pipeline.validate().map_err(ConfigError::Invalid)
    }
}

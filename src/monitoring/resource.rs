//! Resource Usage Sampling
//!
//! Reads CPU and memory usage of the current process and packages each
//! reading as a tagged [`Observation`] ready for a gauge callback.

use std::thread;
use std::time::Duration;

use opentelemetry::KeyValue;
use sysinfo::{get_current_pid, Pid, Process, ProcessRefreshKind, System};
use thiserror::Error;

use super::binder::CorrelationId;

/// Fixed value of the `process` attribute on every observation.
pub const PROCESS_LABEL: &str = "etl-pipeline";

/// Attribute key carrying the fixed process label.
pub const PROCESS_ATTRIBUTE: &str = "process";

/// Attribute key carrying the correlation identifier.
pub const CORRELATION_ATTRIBUTE: &str = "span_id";

/// Default window over which CPU utilization is measured.
pub const DEFAULT_CPU_WINDOW: Duration = Duration::from_millis(500);

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Error)]
pub enum SamplerError {
    #[error("Failed to determine current process ID: {0}")]
    ProcessId(String),
    #[error("Process {0} not found in system table")]
    ProcessNotFound(String),
}

/// Which resource a gauge reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Cpu,
    Ram,
}

impl ResourceKind {
    /// Exported metric name.
    pub fn gauge_name(&self) -> &'static str {
        match self {
            ResourceKind::Cpu => "cpu_usage_percent",
            ResourceKind::Ram => "ram_usage_mb",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ResourceKind::Cpu => "CPU usage per ETL step",
            ResourceKind::Ram => "RAM usage per ETL step",
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            ResourceKind::Cpu => "%",
            ResourceKind::Ram => "MB",
        }
    }
}

/// A single gauge reading with its attribute set.
#[derive(Debug, Clone)]
pub struct Observation {
    /// Measured value (never negative)
    pub value: f64,
    /// `process` and `span_id` attributes
    pub attributes: Vec<KeyValue>,
}

impl Observation {
    /// Builds an observation tagged with the process label and correlation id.
    pub fn tagged(value: f64, correlation: &CorrelationId) -> Self {
        Self {
            value: value.max(0.0),
            attributes: vec![
                KeyValue::new(PROCESS_ATTRIBUTE, PROCESS_LABEL),
                KeyValue::new(CORRELATION_ATTRIBUTE, correlation.to_string()),
            ],
        }
    }

    /// Looks up an attribute value by key.
    pub fn attribute(&self, key: &str) -> Option<String> {
        self.attributes
            .iter()
            .find(|kv| kv.key.as_str() == key)
            .map(|kv| kv.value.as_str().into_owned())
    }

    /// The correlation identifier this observation was tagged with.
    pub fn correlation(&self) -> Option<String> {
        self.attribute(CORRELATION_ATTRIBUTE)
    }
}

/// Samples resource usage of the current process.
///
/// Every read is synchronous. CPU reads block for the measurement window,
/// since utilization is the CPU time consumed between two refreshes.
///
/// # Example
///
/// ```rust,no_run
/// use pipetrace::monitoring::{CorrelationId, ResourceSampler};
///
/// let mut sampler = ResourceSampler::new()?;
/// let id = CorrelationId::new("00f067aa0ba902b7");
///
/// let ram = sampler.sample_ram(&id)?;
/// println!("RSS: {:.1} MB", ram.value);
/// # Ok::<(), pipetrace::monitoring::SamplerError>(())
/// ```
pub struct ResourceSampler {
    system: System,
    process_id: Pid,
    cpu_window: Duration,
}

impl ResourceSampler {
    /// Creates a sampler bound to the current process.
    pub fn new() -> Result<Self, SamplerError> {
        let process_id =
            get_current_pid().map_err(|e| SamplerError::ProcessId(e.to_string()))?;

        Ok(Self {
            system: System::new(),
            process_id,
            cpu_window: DEFAULT_CPU_WINDOW,
        })
    }

    /// Sets the window over which CPU utilization is measured.
    pub fn with_cpu_window(mut self, window: Duration) -> Self {
        self.cpu_window = window;
        self
    }

    /// Returns the configured CPU measurement window.
    pub fn cpu_window(&self) -> Duration {
        self.cpu_window
    }

    /// Takes a sample of the given kind.
    pub fn sample(
        &mut self,
        kind: ResourceKind,
        correlation: &CorrelationId,
    ) -> Result<Observation, SamplerError> {
        match kind {
            ResourceKind::Cpu => self.sample_cpu(correlation),
            ResourceKind::Ram => self.sample_ram(correlation),
        }
    }

    /// Returns process CPU utilization in percent over the measurement window.
    ///
    /// Blocks the calling thread for the whole window. Values above 100 are
    /// possible on multi-core hosts.
    pub fn sample_cpu(&mut self, correlation: &CorrelationId) -> Result<Observation, SamplerError> {
        let refresh_kind = ProcessRefreshKind::new().with_cpu();

        // First refresh establishes the baseline
        self.system.refresh_processes_specifics(refresh_kind);
        thread::sleep(self.cpu_window);
        self.system.refresh_processes_specifics(refresh_kind);

        let cpu = self.process()?.cpu_usage();
        Ok(Observation::tagged(f64::from(cpu), correlation))
    }

    /// Returns resident memory of the process in megabytes.
    pub fn sample_ram(&mut self, correlation: &CorrelationId) -> Result<Observation, SamplerError> {
        self.system
            .refresh_processes_specifics(ProcessRefreshKind::new().with_memory());

        let ram_mb = self.process()?.memory() as f64 / BYTES_PER_MB;
        Ok(Observation::tagged(ram_mb, correlation))
    }

    fn process(&self) -> Result<&Process, SamplerError> {
        self.system
            .process(self.process_id)
            .ok_or_else(|| SamplerError::ProcessNotFound(self.process_id.to_string()))
    }
}

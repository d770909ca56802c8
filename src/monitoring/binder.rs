//! Span-Scoped Metric Correlation
//!
//! Gauge callbacks run on the metric reader's schedule, independent of the
//! pipeline. Instead of swapping callbacks when a run starts, every callback
//! reads the current correlation identifier from a shared [`SpanScope`] at
//! sample time. A rebind is a single write under a lock, so a sample sees
//! either the old identifier or the new one, never a mix.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use log::{debug, error};
use opentelemetry::metrics::{AsyncInstrument, Meter, ObservableGauge};
use opentelemetry::trace::SpanId;
use tokio::runtime::{Handle, RuntimeFlavor};

use super::resource::{Observation, ResourceKind, ResourceSampler, SamplerError};

/// Correlation value reported before any pipeline run has started.
pub const INITIAL_CORRELATION: &str = "init";

/// Identifier that ties metric observations to a trace span.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationId(String);

impl CorrelationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The placeholder used until the first rebind.
    pub fn initial() -> Self {
        Self(INITIAL_CORRELATION.to_string())
    }

    /// Renders a span id as 16 lowercase hex digits.
    pub fn from_span_id(span_id: SpanId) -> Self {
        Self(span_id.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::initial()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Process-wide holder of the current correlation identifier.
///
/// Cloning shares the same underlying value. The pipeline runner is the only
/// writer; gauge callbacks are readers.
#[derive(Debug, Clone, Default)]
pub struct SpanScope {
    current: Arc<RwLock<CorrelationId>>,
}

impl SpanScope {
    /// Creates a scope holding the initial correlation identifier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the correlation identifier for all subsequent samples.
    pub fn rebind(&self, id: CorrelationId) {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        debug!("Rebinding metric correlation: {} -> {}", current, id);
        *current = id;
    }

    /// Returns a snapshot of the current correlation identifier.
    pub fn current(&self) -> CorrelationId {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// A resource sampler paired with the scope it reads its tag from.
#[derive(Clone)]
pub struct ScopedSampler {
    sampler: Arc<Mutex<ResourceSampler>>,
    scope: SpanScope,
}

impl ScopedSampler {
    pub fn new(sampler: ResourceSampler, scope: SpanScope) -> Self {
        Self {
            sampler: Arc::new(Mutex::new(sampler)),
            scope,
        }
    }

    /// Takes one sample tagged with the identifier current at call time.
    ///
    /// The identifier is read exactly once, before sampling starts. CPU
    /// samples block for the measurement window; on a multi-threaded tokio
    /// worker that wait runs under `block_in_place`.
    pub fn observe(&self, kind: ResourceKind) -> Result<Observation, SamplerError> {
        let correlation = self.scope.current();
        blocking(|| {
            let mut sampler = self.sampler.lock().unwrap_or_else(PoisonError::into_inner);
            sampler.sample(kind, &correlation)
        })
    }

    pub fn scope(&self) -> &SpanScope {
        &self.scope
    }
}

/// Runs `f`, handing the current worker's tasks to other workers first when
/// called on a multi-threaded runtime. A current-thread runtime cannot do
/// that, so there `f` runs inline.
fn blocking<R>(f: impl FnOnce() -> R) -> R {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(f)
        }
        _ => f(),
    }
}

/// The CPU and RAM observable gauges.
///
/// Callbacks stay registered for the lifetime of the meter provider.
pub struct ResourceGauges {
    _cpu: ObservableGauge<f64>,
    _ram: ObservableGauge<f64>,
    sampler: ScopedSampler,
}

impl ResourceGauges {
    /// Registers both gauges on `meter`, sampling through `sampler`.
    pub fn register(meter: &Meter, sampler: ScopedSampler) -> Self {
        let cpu = register_gauge(meter, ResourceKind::Cpu, sampler.clone());
        let ram = register_gauge(meter, ResourceKind::Ram, sampler.clone());

        Self {
            _cpu: cpu,
            _ram: ram,
            sampler,
        }
    }

    /// The scope the gauge callbacks read from.
    pub fn scope(&self) -> &SpanScope {
        self.sampler.scope()
    }
}

fn register_gauge(meter: &Meter, kind: ResourceKind, sampler: ScopedSampler) -> ObservableGauge<f64> {
    meter
        .f64_observable_gauge(kind.gauge_name())
        .with_description(kind.description())
        .with_unit(kind.unit())
        .with_callback(move |observer| report(observer, kind, sampler.observe(kind)))
        .build()
}

/// Hands a sample to the metric SDK. Callbacks cannot propagate errors, so
/// a failed sample is logged and skipped for this cycle.
fn report(
    observer: &dyn AsyncInstrument<f64>,
    kind: ResourceKind,
    sample: Result<Observation, SamplerError>,
) {
    match sample {
        Ok(observation) => observer.observe(observation.value, &observation.attributes),
        Err(e) => error!("Failed to sample {}: {}", kind.gauge_name(), e),
    }
}

//! Resource Monitoring Module
//!
//! Samples process resource usage, correlates the samples with the active
//! pipeline span, and tracks the stage timeline of a run.
//!
//! # Components
//!
//! - [`ResourceSampler`]: point-in-time CPU and memory reads
//! - [`SpanScope`]: correlation identifier shared with gauge callbacks
//! - [`ResourceGauges`]: observable gauges bound to a sampler and scope
//! - [`ExecutionTimeline`]: stage start/end timing for Gantt charts

pub mod binder;
pub mod resource;
pub mod timeline;

pub use binder::{CorrelationId, ResourceGauges, ScopedSampler, SpanScope};
pub use resource::{
    Observation, ResourceKind, ResourceSampler, SamplerError, CORRELATION_ATTRIBUTE, PROCESS_LABEL,
};
pub use timeline::{EventType, ExecutionTimeline, TimelineEvent};

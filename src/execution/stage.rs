//! Pipeline Stages
//!
//! A stage is one unit of pipeline work traced under its own span. The
//! standard plan is extract and transform (CPU burn) followed by load
//! (random idle delay).

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::workload::Workload;

use super::state::PipelineState;

/// The three stages of an ETL pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    Extract,
    Transform,
    Load,
}

impl StageKind {
    /// All stages in execution order.
    pub const ALL: [StageKind; 3] = [StageKind::Extract, StageKind::Transform, StageKind::Load];

    /// Span name for this stage.
    pub fn name(&self) -> &'static str {
        match self {
            StageKind::Extract => "extract",
            StageKind::Transform => "transform",
            StageKind::Load => "load",
        }
    }

    /// Log message emitted inside the stage span on success.
    pub fn completion_message(&self) -> &'static str {
        match self {
            StageKind::Extract => "Extract step completed",
            StageKind::Transform => "Transform step completed",
            StageKind::Load => "Load step completed",
        }
    }

    /// Runner state while this stage executes.
    pub fn state(&self) -> PipelineState {
        match self {
            StageKind::Extract => PipelineState::Extracting,
            StageKind::Transform => PipelineState::Transforming,
            StageKind::Load => PipelineState::Loading,
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error)]
pub enum StageError {
    #[error("Workload failed: {0}")]
    Workload(String),
}

/// A unit of pipeline work.
///
/// Implementations report failure through the returned `Result`; the runner
/// translates it into the span status.
pub trait Stage: Send {
    fn kind(&self) -> StageKind;

    fn execute(&self) -> Result<(), StageError>;
}

/// A stage that performs a synthetic [`Workload`].
#[derive(Debug, Clone)]
pub struct WorkloadStage {
    kind: StageKind,
    workload: Workload,
}

impl WorkloadStage {
    pub fn new(kind: StageKind, workload: Workload) -> Self {
        Self { kind, workload }
    }

    pub fn workload(&self) -> &Workload {
        &self.workload
    }
}

impl Stage for WorkloadStage {
    fn kind(&self) -> StageKind {
        self.kind
    }

    fn execute(&self) -> Result<(), StageError> {
        self.workload.perform();
        Ok(())
    }
}

/// Durations for the standard ETL stages, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelinePlan {
    /// CPU burn time of the extract stage
    pub extract_seconds: f64,
    /// CPU burn time of the transform stage
    pub transform_seconds: f64,
    /// Lower bound of the load stage's idle delay
    pub load_min_seconds: f64,
    /// Upper bound of the load stage's idle delay
    pub load_max_seconds: f64,
}

impl Default for PipelinePlan {
    fn default() -> Self {
        Self {
            extract_seconds: 4.0,
            transform_seconds: 4.0,
            load_min_seconds: 1.0,
            load_max_seconds: 2.0,
        }
    }
}

impl PipelinePlan {
    /// Checks that every duration is finite and non-negative.
    pub fn validate(&self) -> Result<(), String> {
        let fields = [
            ("extract_seconds", self.extract_seconds),
            ("transform_seconds", self.transform_seconds),
            ("load_min_seconds", self.load_min_seconds),
            ("load_max_seconds", self.load_max_seconds),
        ];

        for (name, value) in fields {
            if !value.is_finite() || value < 0.0 {
                return Err(format!("{} must be a non-negative number, got {}", name, value));
            }
        }
        Ok(())
    }

    /// Builds the extract, transform and load stages.
    pub fn stages(&self) -> Vec<Box<dyn Stage>> {
        vec![
            Box::new(WorkloadStage::new(
                StageKind::Extract,
                Workload::Burn(seconds(self.extract_seconds)),
            )),
            Box::new(WorkloadStage::new(
                StageKind::Transform,
                Workload::Burn(seconds(self.transform_seconds)),
            )),
            Box::new(WorkloadStage::new(
                StageKind::Load,
                Workload::Idle {
                    min: seconds(self.load_min_seconds),
                    max: seconds(self.load_max_seconds),
                },
            )),
        ]
    }

    /// Lower bound on the total run time.
    pub fn min_duration(&self) -> Duration {
        seconds(self.extract_seconds) + seconds(self.transform_seconds) + seconds(self.load_min_seconds)
    }

    /// Upper bound on the total time spent in stage workloads.
    pub fn max_duration(&self) -> Duration {
        let load = seconds(self.load_min_seconds).max(seconds(self.load_max_seconds));
        seconds(self.extract_seconds) + seconds(self.transform_seconds) + load
    }
}

/// Invalid durations collapse to zero; `validate` reports them.
fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}

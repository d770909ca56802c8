//! Pipeline Execution Module
//!
//! Provides the runner that sequences pipeline stages under trace spans.
//!
//! # Architecture
//!
//! - [`engine`]: Runner orchestrating one pipeline run
//! - [`stage`]: Stage trait, the ETL stage kinds and their plan
//! - [`state`]: Run state machine

pub mod engine;
pub mod stage;
pub mod state;

pub use engine::{PipelineError, PipelineRunner, RunReport, StageReport, PIPELINE_SPAN};
pub use stage::{PipelinePlan, Stage, StageError, StageKind, WorkloadStage};
pub use state::PipelineState;

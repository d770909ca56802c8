//! Pipeline Execution Engine
//!
//! Runs the stages of a pipeline strictly in order inside one parent span:
//! - Opens the parent span and derives the run's correlation identifier
//! - Rebinds the metric scope so gauge samples carry that identifier
//! - Opens one child span per stage and logs completion inside it
//! - Translates each stage result into the span's terminal status

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use log::{error, info};
use opentelemetry::trace::{Status, TraceContextExt, Tracer};
use thiserror::Error;

use crate::monitoring::{CorrelationId, EventType, ExecutionTimeline, SpanScope};

use super::stage::{PipelinePlan, Stage, StageError, StageKind};
use super::state::PipelineState;

/// Name of the span that encloses a whole run.
pub const PIPELINE_SPAN: &str = "etl-full-pipeline";

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Stage '{stage}' failed: {source}")]
    Stage {
        stage: StageKind,
        #[source]
        source: StageError,
    },
    #[error("Pipeline has already run (state: {0})")]
    AlreadyRun(PipelineState),
}

/// Outcome of one successful stage.
#[derive(Debug, Clone)]
pub struct StageReport {
    pub kind: StageKind,
    /// Span id of the stage span, 16 hex digits
    pub span_id: String,
    pub duration: Duration,
}

/// Outcome of a successful pipeline run.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Identifier of the parent span, also carried by metric samples
    pub correlation_id: CorrelationId,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
    pub stages: Vec<StageReport>,
    pub timeline: ExecutionTimeline,
}

impl RunReport {
    /// Returns a human-readable summary of the run.
    pub fn summary(&self) -> String {
        let mut out = format!(
            "Pipeline Run:\n  Started: {}\n  Span: {}\n  Total: {:.2?}\n",
            self.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
            self.correlation_id,
            self.elapsed
        );
        for stage in &self.stages {
            out.push_str(&format!(
                "  {:10} {:>10.2?}  (span {})\n",
                stage.kind.name(),
                stage.duration,
                stage.span_id
            ));
        }
        out
    }
}

/// Sequential pipeline runner.
///
/// A runner executes its stages once. Any tracer works; the parent and
/// stage spans are made active while they run so log records emitted inside
/// pick up their context.
///
/// # Example
///
/// ```rust,no_run
/// use opentelemetry::global;
/// use pipetrace::execution::PipelineRunner;
/// use pipetrace::monitoring::SpanScope;
///
/// let mut runner = PipelineRunner::new(global::tracer("etl-tracer"), SpanScope::new());
/// let report = runner.run()?;
/// println!("{}", report.summary());
/// # Ok::<(), pipetrace::execution::PipelineError>(())
/// ```
pub struct PipelineRunner<T> {
    tracer: T,
    scope: SpanScope,
    stages: Vec<Box<dyn Stage>>,
    state: PipelineState,
}

impl<T> PipelineRunner<T>
where
    T: Tracer,
    T::Span: Send + Sync + 'static,
{
    /// Creates a runner with the standard extract/transform/load plan.
    pub fn new(tracer: T, scope: SpanScope) -> Self {
        Self {
            tracer,
            scope,
            stages: PipelinePlan::default().stages(),
            state: PipelineState::Idle,
        }
    }

    /// Replaces the stages with the ones described by `plan`.
    pub fn with_plan(mut self, plan: &PipelinePlan) -> Self {
        self.stages = plan.stages();
        self
    }

    /// Replaces the stages.
    pub fn with_stages(mut self, stages: Vec<Box<dyn Stage>>) -> Self {
        self.stages = stages;
        self
    }

    /// Current state of the run.
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Executes every stage in order.
    ///
    /// # Returns
    ///
    /// * `Ok(RunReport)` - All stages completed
    /// * `Err(PipelineError::Stage)` - A stage failed; later stages were skipped
    /// * `Err(PipelineError::AlreadyRun)` - This runner was used before
    pub fn run(&mut self) -> Result<RunReport, PipelineError> {
        if self.state != PipelineState::Idle {
            return Err(PipelineError::AlreadyRun(self.state));
        }

        let Self {
            tracer,
            scope,
            stages,
            state,
        } = self;
        let tracer: &T = tracer;

        let started_at = Utc::now();
        let start_time = Instant::now();
        let mut timeline = ExecutionTimeline::new();

        info!("Starting pipeline ({} stages)", stages.len());

        tracer.in_span(PIPELINE_SPAN, |cx| {
            let parent = cx.span();
            let correlation_id = CorrelationId::from_span_id(parent.span_context().span_id());
            scope.rebind(correlation_id.clone());
            info!("Pipeline span: {}", correlation_id);

            let mut reports = Vec::with_capacity(stages.len());

            for stage in stages.iter() {
                let kind = stage.kind();
                *state = kind.state();
                timeline.add_event(kind.name(), EventType::Started);
                let stage_start = Instant::now();

                match run_stage(tracer, stage.as_ref()) {
                    Ok(span_id) => {
                        timeline.add_event(kind.name(), EventType::Completed);
                        reports.push(StageReport {
                            kind,
                            span_id,
                            duration: stage_start.elapsed(),
                        });
                    }
                    Err(source) => {
                        timeline.add_event(kind.name(), EventType::Failed);
                        parent.set_status(Status::error(format!("stage '{}' failed", kind)));
                        return Err(PipelineError::Stage {
                            stage: kind,
                            source,
                        });
                    }
                }
            }

            parent.set_status(Status::Ok);
            *state = PipelineState::Done;

            Ok(RunReport {
                correlation_id,
                started_at,
                elapsed: start_time.elapsed(),
                stages: reports,
                timeline,
            })
        })
    }
}

/// Runs one stage inside its own active span and returns the span id.
fn run_stage<T>(tracer: &T, stage: &dyn Stage) -> Result<String, StageError>
where
    T: Tracer,
    T::Span: Send + Sync + 'static,
{
    let kind = stage.kind();

    tracer.in_span(kind.name(), |cx| {
        let span = cx.span();
        let span_id = span.span_context().span_id().to_string();

        match stage.execute() {
            Ok(()) => {
                info!("{}", kind.completion_message());
                span.set_status(Status::Ok);
                Ok(span_id)
            }
            Err(e) => {
                error!("{} step failed: {}", kind, e);
                span.record_error(&e);
                span.set_status(Status::error(e.to_string()));
                Err(e)
            }
        }
    })
}

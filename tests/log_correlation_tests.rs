//! Completion records shipped through the installed logger and the
//! OpenTelemetry log bridge carry their stage span's context.

use opentelemetry::logs::AnyValue;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::logs::LoggerProvider;
use opentelemetry_sdk::testing::logs::InMemoryLogExporter;
use opentelemetry_sdk::testing::trace::InMemorySpanExporter;
use opentelemetry_sdk::trace::TracerProvider;

use pipetrace::execution::{PipelinePlan, PipelineRunner, StageKind, PIPELINE_SPAN};
use pipetrace::monitoring::SpanScope;
use pipetrace::telemetry::init_logging;

fn body_text(body: &Option<AnyValue>) -> Option<&str> {
    match body {
        Some(AnyValue::String(text)) => Some(text.as_str()),
        _ => None,
    }
}

#[test]
fn test_completion_records_carry_stage_span_ids() {
    let log_exporter = InMemoryLogExporter::default();
    let logger_provider = LoggerProvider::builder()
        .with_simple_exporter(log_exporter.clone())
        .build();

    let forwarder = init_logging(false).unwrap();
    forwarder.attach(&logger_provider);

    let span_exporter = InMemorySpanExporter::default();
    let tracer_provider = TracerProvider::builder()
        .with_simple_exporter(span_exporter.clone())
        .build();

    let plan = PipelinePlan {
        extract_seconds: 0.02,
        transform_seconds: 0.02,
        load_min_seconds: 0.0,
        load_max_seconds: 0.01,
    };
    let mut runner =
        PipelineRunner::new(tracer_provider.tracer("etl-tracer"), SpanScope::new()).with_plan(&plan);
    runner.run().unwrap();

    let spans = span_exporter.get_finished_spans().unwrap();
    let emitted = log_exporter.get_emitted_logs().unwrap();

    for kind in StageKind::ALL {
        let span = spans.iter().find(|s| s.name == kind.name()).unwrap();
        let records: Vec<_> = emitted
            .iter()
            .filter(|log| body_text(&log.record.body) == Some(kind.completion_message()))
            .collect();

        assert_eq!(records.len(), 1, "one '{}' record", kind.completion_message());
        let context = records[0]
            .record
            .trace_context
            .as_ref()
            .expect("record emitted inside a span");
        assert_eq!(context.span_id, span.span_context.span_id());
        assert_eq!(context.trace_id, span.span_context.trace_id());
    }

    // Records outside stage spans still belong to the run's trace
    let parent = spans.iter().find(|s| s.name == PIPELINE_SPAN).unwrap();
    let starting = emitted
        .iter()
        .find(|log| {
            body_text(&log.record.body).is_some_and(|text| text.starts_with("Pipeline span:"))
        })
        .unwrap();
    assert_eq!(
        starting.record.trace_context.as_ref().map(|c| c.span_id),
        Some(parent.span_context.span_id())
    );
}

//! End-to-end pipeline runs against in-memory telemetry.

use std::sync::Mutex;
use std::time::Duration;

use log::{Log, Metadata, Record};
use once_cell::sync::Lazy;
use opentelemetry::metrics::MeterProvider as _;
use opentelemetry::trace::{SpanId, Status, TraceContextExt, TracerProvider as _};
use opentelemetry::Context;
use opentelemetry_sdk::metrics::data::Gauge;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::runtime;
use opentelemetry_sdk::testing::metrics::InMemoryMetricExporter;
use opentelemetry_sdk::testing::trace::InMemorySpanExporter;
use opentelemetry_sdk::trace::TracerProvider;

use pipetrace::execution::{PipelinePlan, PipelineRunner, PIPELINE_SPAN};
use pipetrace::monitoring::{
    ResourceGauges, ResourceSampler, ScopedSampler, SpanScope, CORRELATION_ATTRIBUTE,
};

/// Log records paired with the span id active when they were emitted.
struct SpanCapture {
    records: Mutex<Vec<(String, SpanId)>>,
}

impl Log for SpanCapture {
    fn enabled(&self, _: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        let span_id = Context::current().span().span_context().span_id();
        self.records
            .lock()
            .unwrap()
            .push((record.args().to_string(), span_id));
    }

    fn flush(&self) {}
}

static CAPTURE: Lazy<&'static SpanCapture> = Lazy::new(|| {
    let capture: &'static SpanCapture = Box::leak(Box::new(SpanCapture {
        records: Mutex::new(Vec::new()),
    }));
    log::set_logger(capture).unwrap();
    log::set_max_level(log::LevelFilter::Info);
    capture
});

fn captured_with(message: &str) -> Vec<SpanId> {
    CAPTURE
        .records
        .lock()
        .unwrap()
        .iter()
        .filter(|(text, _)| text == message)
        .map(|(_, id)| *id)
        .collect()
}

fn span_provider() -> (TracerProvider, InMemorySpanExporter) {
    let exporter = InMemorySpanExporter::default();
    let provider = TracerProvider::builder()
        .with_simple_exporter(exporter.clone())
        .build();
    (provider, exporter)
}

#[test]
fn test_default_pipeline_end_to_end() {
    Lazy::force(&CAPTURE);
    let (provider, exporter) = span_provider();

    let mut runner = PipelineRunner::new(provider.tracer("etl-tracer"), SpanScope::new());
    let report = runner.run().unwrap();

    // Two 4 s burns plus a 1-2 s idle
    assert!(report.elapsed >= Duration::from_secs(9), "{:?}", report.elapsed);
    assert!(report.elapsed <= Duration::from_millis(11_500), "{:?}", report.elapsed);

    let spans = exporter.get_finished_spans().unwrap();
    assert_eq!(spans.len(), 4);

    let parent = spans.iter().find(|s| s.name == PIPELINE_SPAN).unwrap();
    assert_eq!(parent.status, Status::Ok);

    let children: Vec<_> = spans.iter().filter(|s| s.name != PIPELINE_SPAN).collect();
    assert_eq!(children.len(), 3);
    for child in &children {
        assert_eq!(child.parent_span_id, parent.span_context.span_id());
        assert!(child.end_time <= parent.end_time);
    }

    for stage in &report.stages {
        let span = children
            .iter()
            .find(|s| s.name == stage.kind.name())
            .unwrap();
        let ids = captured_with(stage.kind.completion_message());
        assert!(
            ids.contains(&span.span_context.span_id()),
            "'{}' not logged inside its span",
            stage.kind.completion_message()
        );
    }
}

#[test]
fn test_completion_logs_follow_stage_spans() {
    Lazy::force(&CAPTURE);
    let (provider, exporter) = span_provider();
    let plan = PipelinePlan {
        extract_seconds: 0.05,
        transform_seconds: 0.05,
        load_min_seconds: 0.0,
        load_max_seconds: 0.01,
    };

    let mut runner =
        PipelineRunner::new(provider.tracer("etl-tracer"), SpanScope::new()).with_plan(&plan);
    let report = runner.run().unwrap();
    let spans = exporter.get_finished_spans().unwrap();

    for stage in &report.stages {
        let span = spans.iter().find(|s| s.name == stage.kind.name()).unwrap();
        assert_eq!(stage.span_id, span.span_context.span_id().to_string());
        assert!(captured_with(stage.kind.completion_message())
            .contains(&span.span_context.span_id()));
    }

    // Nothing is logged under the parent span with a stage message
    let parent = spans.iter().find(|s| s.name == PIPELINE_SPAN).unwrap();
    assert!(!captured_with("Extract step completed").contains(&parent.span_context.span_id()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_gauges_carry_parent_span_id() {
    let metric_exporter = InMemoryMetricExporter::default();
    let reader = PeriodicReader::builder(metric_exporter.clone(), runtime::Tokio)
        .with_interval(Duration::from_secs(60))
        .build();
    let meter_provider = SdkMeterProvider::builder().with_reader(reader).build();

    let scope = SpanScope::new();
    let sampler = ResourceSampler::new()
        .unwrap()
        .with_cpu_window(Duration::from_millis(10));
    let _gauges = ResourceGauges::register(
        &meter_provider.meter("etl-metrics"),
        ScopedSampler::new(sampler, scope.clone()),
    );

    let (provider, exporter) = span_provider();
    let plan = PipelinePlan {
        extract_seconds: 0.02,
        transform_seconds: 0.02,
        load_min_seconds: 0.0,
        load_max_seconds: 0.0,
    };
    let mut runner = PipelineRunner::new(provider.tracer("etl-tracer"), scope).with_plan(&plan);

    let reader_exporter = metric_exporter.clone();
    let (flushed, exported) = tokio::task::spawn_blocking(move || {
        let report = runner.run().unwrap();

        // The reader's worker task may not be polled yet; a flush before
        // then exports nothing.
        let mut exported = Vec::new();
        for _ in 0..40 {
            let _ = meter_provider.force_flush();
            exported = reader_exporter.get_finished_metrics().unwrap();
            if !exported.is_empty() {
                break;
            }
            std::thread::sleep(Duration::from_millis(50));
        }

        // Shutdown clears the in-memory exporter, so read it first
        meter_provider.shutdown().unwrap();
        (report, exported)
    })
    .await
    .unwrap();

    let spans = exporter.get_finished_spans().unwrap();
    let parent = spans.iter().find(|s| s.name == PIPELINE_SPAN).unwrap();
    let expected = parent.span_context.span_id().to_string();
    assert_eq!(flushed.correlation_id.as_str(), expected);

    assert!(!exported.is_empty(), "no metrics collected");
    let mut gauges_seen = Vec::new();

    for metric in exported
        .iter()
        .flat_map(|rm| rm.scope_metrics.iter())
        .flat_map(|sm| sm.metrics.iter())
    {
        let gauge = metric
            .data
            .as_any()
            .downcast_ref::<Gauge<f64>>()
            .expect("resource metrics are f64 gauges");
        for point in &gauge.data_points {
            let tag = point
                .attributes
                .iter()
                .find(|kv| kv.key.as_str() == CORRELATION_ATTRIBUTE)
                .map(|kv| kv.value.to_string());
            assert_eq!(tag.as_deref(), Some(expected.as_str()));
        }
        gauges_seen.push(metric.name.to_string());
    }

    gauges_seen.sort();
    gauges_seen.dedup();
    assert_eq!(gauges_seen, vec!["cpu_usage_percent", "ram_usage_mb"]);
}

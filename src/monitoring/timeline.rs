//! Execution Timeline
//!
//! Records stage start/end instants of a pipeline run for the end-of-run
//! report and its ASCII Gantt chart.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Width of the Gantt chart bar area, in characters.
const CHART_WIDTH: f64 = 50.0;

/// Type of timeline event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    /// Stage started executing
    Started,
    /// Stage finished successfully
    Completed,
    /// Stage returned an error
    Failed,
}

/// A single event in the execution timeline.
#[derive(Debug, Clone)]
pub struct TimelineEvent {
    /// Name of the stage
    pub stage: String,
    /// Type of event
    pub event_type: EventType,
    /// Offset from the start of the timeline
    pub offset: Duration,
}

/// Tracks when each pipeline stage starts and ends.
#[derive(Debug, Clone)]
pub struct ExecutionTimeline {
    events: Vec<TimelineEvent>,
    start_time: Instant,
}

impl ExecutionTimeline {
    /// Creates a new timeline starting now.
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
            start_time: Instant::now(),
        }
    }

    /// Records an event for a stage.
    pub fn add_event(&mut self, stage: impl Into<String>, event_type: EventType) {
        self.events.push(TimelineEvent {
            stage: stage.into(),
            event_type,
            offset: self.start_time.elapsed(),
        });
    }

    /// Returns all recorded events in insertion order.
    pub fn get_events(&self) -> &[TimelineEvent] {
        &self.events
    }

    /// Returns the total elapsed time since timeline creation.
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Returns `(stage, start, end)` for every stage that has finished,
    /// ordered by start offset.
    pub fn spans(&self) -> Vec<(String, Duration, Duration)> {
        let mut open: HashMap<&str, Duration> = HashMap::new();
        let mut closed = Vec::new();

        for event in &self.events {
            match event.event_type {
                EventType::Started => {
                    open.insert(event.stage.as_str(), event.offset);
                }
                EventType::Completed | EventType::Failed => {
                    if let Some(start) = open.remove(event.stage.as_str()) {
                        closed.push((event.stage.clone(), start, event.offset));
                    }
                }
            }
        }

        closed.sort_by_key(|(_, start, _)| *start);
        closed
    }

    /// Returns stage durations keyed by stage name.
    pub fn get_durations(&self) -> HashMap<String, Duration> {
        self.spans()
            .into_iter()
            .map(|(stage, start, end)| (stage, end.saturating_sub(start)))
            .collect()
    }

    /// Generates an ASCII Gantt chart of the finished stages.
    pub fn gantt_chart(&self) -> String {
        let mut output = String::from("\nExecution Timeline:\n\n");

        let total_ms = self.elapsed().as_millis();
        if total_ms == 0 {
            return output;
        }

        let scale = CHART_WIDTH / total_ms as f64;

        for (stage, start, end) in self.spans() {
            let start_ms = start.as_millis();
            let duration_ms = end.saturating_sub(start).as_millis();

            let offset = (start_ms as f64 * scale) as usize;
            let width = (duration_ms as f64 * scale).max(1.0) as usize;

            output.push_str(&format!(
                "{:12} |{}{}| ({} ms)\n",
                truncate(&stage, 12),
                " ".repeat(offset),
                "#".repeat(width),
                duration_ms
            ));
        }

        output.push_str(&format!("\nTotal: {} ms\n", total_ms));
        output
    }
}

impl Default for ExecutionTimeline {
    fn default() -> Self {
        Self::new()
    }
}

/// Pads or truncates a label to exactly `max_len` characters.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        format!("{:width$}", s, width = max_len)
    } else {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{}...", head)
    }
}

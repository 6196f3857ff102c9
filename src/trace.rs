//! Chrome Trace Event Format profiler, implemented as a `tracing_subscriber`
//! layer: every span enter/exit becomes a `"ph": "B"`/`"E"` event. Load the
//! resulting JSON file at `chrome://tracing`.

use std::sync::Mutex;
use std::time::Instant;

use serde::Serialize;
use tracing::span;
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

#[derive(Serialize)]
struct TraceEvent {
    name: String,
    cat: &'static str,
    ph: &'static str,
    ts: f64,
    tid: u64,
    pid: u32,
}

#[derive(Serialize)]
struct ThreadNameEvent {
    name: &'static str,
    ph: &'static str,
    pid: u32,
    tid: u64,
    args: ThreadNameArgs,
}

#[derive(Serialize)]
struct ThreadNameArgs {
    name: String,
}

#[derive(Serialize)]
struct Trace {
    #[serde(rename = "traceEvents")]
    trace_events: Vec<serde_json::Value>,
    #[serde(rename = "displayTimeUnit")]
    display_time_unit: &'static str,
}

pub struct ChromeTraceLayer {
    start: Instant,
    events: Mutex<Vec<TraceEvent>>,
    output_path: String,
}

impl ChromeTraceLayer {
    pub fn new(output_path: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            events: Mutex::new(Vec::new()),
            output_path: output_path.into(),
        }
    }

    fn timestamp_micros(&self) -> f64 {
        self.start.elapsed().as_micros() as f64
    }

    fn thread_id() -> u64 {
        // A stable per-thread integer derived from the std ThreadId's Debug
        // representation; good enough to distinguish tracks in the viewer.
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        std::thread::current().id().hash(&mut hasher);
        hasher.finish()
    }

    /// Serializes the buffered events to `output_path` as Chrome Trace JSON.
    /// Called once at shutdown from the UI thread.
    pub fn finish(&self) {
        let events = self.events.lock().unwrap();
        let mut trace_events: Vec<serde_json::Value> = Vec::with_capacity(events.len() + 1);
        trace_events.push(
            serde_json::to_value(ThreadNameEvent {
                name: "thread_name",
                ph: "M",
                pid: 1,
                tid: 0,
                args: ThreadNameArgs {
                    name: "main".to_string(),
                },
            })
            .unwrap(),
        );
        for event in events.iter() {
            trace_events.push(serde_json::to_value(event).unwrap());
        }

        let trace = Trace {
            trace_events,
            display_time_unit: "ms",
        };

        if let Ok(json) = serde_json::to_string(&trace) {
            if let Err(err) = std::fs::write(&self.output_path, json) {
                tracing::warn!(path = %self.output_path, error = %err, "failed to write trace file");
            } else {
                tracing::info!(path = %self.output_path, "trace written");
            }
        }
    }
}

impl<S> Layer<S> for ChromeTraceLayer
where
    S: tracing::Subscriber,
{
    fn on_enter(&self, id: &span::Id, ctx: Context<'_, S>) {
        if let Some(span) = ctx.span(id) {
            self.events.lock().unwrap().push(TraceEvent {
                name: span.name().to_string(),
                cat: "function",
                ph: "B",
                ts: self.timestamp_micros(),
                tid: Self::thread_id(),
                pid: 1,
            });
        }
    }

    fn on_exit(&self, id: &span::Id, ctx: Context<'_, S>) {
        if let Some(span) = ctx.span(id) {
            self.events.lock().unwrap().push(TraceEvent {
                name: span.name().to_string(),
                cat: "function",
                ph: "E",
                ts: self.timestamp_micros(),
                tid: Self::thread_id(),
                pid: 1,
            });
        }
    }
}

pub mod collector;
pub mod dashboard;
pub mod emitter;

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

pub use collector::{MetricsCollector, MetricsSnapshot};
pub use emitter::MetricEmitter;

/// Prefix shared by every request-timing metric name.
pub const WEB_PREFIX: &str = "web";

/// The request-level metric kinds, each gated by its own config toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    QueueTime,
    Idle,
    Request,
    ResponseSize,
    Middleware,
    Error,
    Apdex,
}

impl MetricKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::QueueTime => "queue_time",
            Self::Idle => "idle",
            Self::Request => "request",
            Self::ResponseSize => "response_size",
            Self::Middleware => "middleware",
            Self::Error => "error",
            Self::Apdex => "apdex",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Sink ────────────────────────────────────────────────────────

/// The metrics backend: the only place measurements leave the crate.
///
/// Implementations must not block and must not panic; they are called
/// from request cleanup, which can run during unwinding.
pub trait MetricsSink: Send + Sync {
    fn gauge(&self, name: &str, value: f64);
    fn increment(&self, name: &str);
}

/// One forwarded observation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Measurement {
    pub name: String,
    pub value: MetricValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum MetricValue {
    Gauge(f64),
    Increment,
}

/// Logs every measurement as a `debug` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl MetricsSink for TracingSink {
    fn gauge(&self, name: &str, value: f64) {
        tracing::debug!(metric = name, value, "gauge");
    }

    fn increment(&self, name: &str) {
        tracing::debug!(metric = name, "increment");
    }
}

/// Forwards to several sinks in order.
#[derive(Default, Clone)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn MetricsSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl MetricsSink for FanoutSink {
    fn gauge(&self, name: &str, value: f64) {
        for sink in &self.sinks {
            sink.gauge(name, value);
        }
    }

    fn increment(&self, name: &str) {
        for sink in &self.sinks {
            sink.increment(name);
        }
    }
}

/// Keeps every measurement in memory, in arrival order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    recorded: Mutex<Vec<Measurement>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn measurements(&self) -> Vec<Measurement> {
        self.recorded.lock().clone()
    }

    pub fn names(&self) -> Vec<String> {
        self.recorded.lock().iter().map(|m| m.name.clone()).collect()
    }

    /// Last gauge value recorded under `name`.
    pub fn gauge_value(&self, name: &str) -> Option<f64> {
        self.recorded
            .lock()
            .iter()
            .rev()
            .find_map(|m| match m.value {
                MetricValue::Gauge(v) if m.name == name => Some(v),
                _ => None,
            })
    }

    pub fn count(&self, name: &str) -> usize {
        self.recorded.lock().iter().filter(|m| m.name == name).count()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.count(name) > 0
    }

    pub fn clear(&self) {
        self.recorded.lock().clear();
    }
}

impl MetricsSink for RecordingSink {
    fn gauge(&self, name: &str, value: f64) {
        self.recorded.lock().push(Measurement {
            name: name.to_owned(),
            value: MetricValue::Gauge(value),
        });
    }

    fn increment(&self, name: &str) {
        self.recorded.lock().push(Measurement {
            name: name.to_owned(),
            value: MetricValue::Increment,
        });
    }
}

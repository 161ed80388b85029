//! Timing for outbound calls: redis commands and external services.
//!
//! Each reporter captures a start time, calls through, and reports the
//! elapsed seconds when the call finishes, fails, or is dropped.
//!
//! There is no dedicated job-queue reporter; a background job is timed by
//! wrapping its future in [`timed`] under a name of its own.

pub mod outbound;
pub mod redis;

use std::time::Instant;

use crate::metrics::MetricsSink;

pub use self::outbound::{timed, ExternalService, OUTGOING_REQUEST};
pub use self::redis::{TimedConnection, CACHE_METRIC};

/// Reports the time since `start` to every enabled name when dropped.
struct ElapsedReport<'a> {
    sink: &'a dyn MetricsSink,
    start: Instant,
    names: Vec<String>,
}

impl<'a> ElapsedReport<'a> {
    fn new(sink: &'a dyn MetricsSink, names: Vec<String>) -> Self {
        Self {
            sink,
            start: Instant::now(),
            names,
        }
    }
}

impl Drop for ElapsedReport<'_> {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed().as_secs_f64();
        for name in &self.names {
            self.sink.gauge(name, elapsed);
        }
    }
}

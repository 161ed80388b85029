use std::sync::Arc;

use axum::http::HeaderMap;
use parking_lot::Mutex;

use super::route::DispatchTarget;

/// Headers an upstream proxy may stamp with the queue-entry time.
pub const QUEUE_START_HEADERS: [&str; 2] = ["x-queue-start", "x-request-start"];

/// Queue-start values at or below this are not epoch seconds.
pub const QUEUE_START_FLOOR: f64 = 1_000_000_000.0;

/// Per-request bag shared between the outer timing middleware, the inner
/// application layer and handlers.
///
/// Cloning is cheap; every clone sees the same slots.
#[derive(Clone)]
pub struct RequestContext {
    inner: Arc<Inner>,
}

struct Inner {
    path: String,
    queue_start: Option<String>,
    request_time: Mutex<Option<ReportedTime>>,
    dispatch: Mutex<Option<Arc<dyn DispatchTarget>>>,
}

/// Application time as handed over by the inner layer.
#[derive(Debug, Clone, PartialEq)]
enum ReportedTime {
    Seconds(f64),
    Raw(String),
}

impl ReportedTime {
    fn seconds(&self) -> f64 {
        let secs = match self {
            Self::Seconds(s) => *s,
            Self::Raw(raw) => raw.trim().parse::<f64>().unwrap_or(0.0),
        };
        if secs.is_finite() {
            secs
        } else {
            0.0
        }
    }
}

impl RequestContext {
    pub fn new(path: impl Into<String>) -> Self {
        Self::build(path.into(), None)
    }

    /// Context for a request carrying the given raw queue-start header.
    pub fn with_queue_start(path: impl Into<String>, queue_start: impl Into<String>) -> Self {
        Self::build(path.into(), Some(queue_start.into()))
    }

    /// Takes the first queue-start header holding a plausible time, so a
    /// garbled `X-Queue-Start` does not hide a good `X-Request-Start`.
    pub fn from_headers(path: impl Into<String>, headers: &HeaderMap) -> Self {
        let queue_start = QUEUE_START_HEADERS
            .iter()
            .filter_map(|name| headers.get(*name)?.to_str().ok())
            .find(|raw| parse_queue_start(raw).is_some())
            .map(str::to_owned);
        Self::build(path.into(), queue_start)
    }

    fn build(path: String, queue_start: Option<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                path,
                queue_start,
                request_time: Mutex::new(None),
                dispatch: Mutex::new(None),
            }),
        }
    }

    pub fn path(&self) -> &str {
        &self.inner.path
    }

    /// Queue-entry time in epoch seconds, if the header holds a plausible one.
    ///
    /// A `t=` prefix (as nginx writes it) is accepted. Missing, unparsable,
    /// non-finite and pre-floor values all yield `None`.
    pub fn queue_start_time(&self) -> Option<f64> {
        parse_queue_start(self.inner.queue_start.as_deref()?)
    }

    /// Called by the inner layer with its own net processing time.
    pub fn record_request_time(&self, secs: f64) {
        *self.inner.request_time.lock() = Some(ReportedTime::Seconds(secs));
    }

    /// Same as [`record_request_time`](Self::record_request_time) for hosts
    /// that hand the value over as text; it is parsed when read.
    pub fn record_raw_request_time(&self, raw: impl Into<String>) {
        *self.inner.request_time.lock() = Some(ReportedTime::Raw(raw.into()));
    }

    /// Read and clear the application time. Absent or unparsable is `0.0`.
    pub fn take_request_time(&self) -> f64 {
        self.inner
            .request_time
            .lock()
            .take()
            .map(|t| t.seconds())
            .unwrap_or(0.0)
    }

    pub fn request_time_is_set(&self) -> bool {
        self.inner.request_time.lock().is_some()
    }

    pub fn set_dispatch<D: DispatchTarget + 'static>(&self, target: D) {
        let target: Arc<dyn DispatchTarget> = Arc::new(target);
        *self.inner.dispatch.lock() = Some(target);
    }

    /// Record `target` unless a handler already named itself.
    pub fn set_dispatch_if_absent<D: DispatchTarget + 'static>(&self, target: D) {
        let mut slot = self.inner.dispatch.lock();
        if slot.is_none() {
            let target: Arc<dyn DispatchTarget> = Arc::new(target);
            *slot = Some(target);
        }
    }

    pub fn dispatch(&self) -> Option<Arc<dyn DispatchTarget>> {
        self.inner.dispatch.lock().clone()
    }
}

fn parse_queue_start(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    let raw = raw.strip_prefix("t=").unwrap_or(raw);
    let value: f64 = raw.parse().ok()?;
    (value.is_finite() && value > QUEUE_START_FLOOR).then_some(value)
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("path", &self.inner.path)
            .field("queue_start", &self.inner.queue_start)
            .field("request_time", &*self.inner.request_time.lock())
            .field("has_dispatch", &self.inner.dispatch.lock().is_some())
            .finish()
    }
}

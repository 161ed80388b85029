//! Per-request time accounting.
//!
//! [`RequestTiming`] splits the wall time of a request into queue wait,
//! application time and middleware overhead, reports the idle gap since
//! the previous request on the same instance, and scores the application
//! time against the apdex threshold.
//!
//! The inner application layer reports its own processing time into the
//! shared [`RequestContext`]; everything outside that is middleware time.

pub mod apdex;
pub mod clock;
pub mod context;
pub mod route;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::body::HttpBody;
use axum::http::{header, Response};

use crate::config::MetricsConfig;
use crate::metrics::{MetricEmitter, MetricKind, MetricsSink};

use apdex::ApdexBucket;
use clock::{Clock, SystemClock};
use context::RequestContext;
use route::RouteClassifier;

/// Bit pattern stored while no previous request end is known: a quiet
/// NaN, which no clock reading produces. Zero would clash with an epoch
/// clock at `0.0`.
const NO_BASELINE: u64 = 0x7ff8_0000_0000_0000;

pub struct RequestTiming {
    emitter: MetricEmitter,
    classifier: RouteClassifier,
    clock: Arc<dyn Clock>,
    /// f64 bits of the previous request's end time on this instance.
    last_request_end: AtomicU64,
}

impl RequestTiming {
    pub fn new(sink: Arc<dyn MetricsSink>, config: Arc<MetricsConfig>) -> Self {
        Self {
            emitter: MetricEmitter::new(sink, config),
            classifier: RouteClassifier::default(),
            clock: Arc::new(SystemClock),
            last_request_end: AtomicU64::new(NO_BASELINE),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_classifier(mut self, classifier: RouteClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Whether the next request will report an idle gap.
    pub fn has_idle_baseline(&self) -> bool {
        self.last_request_end.load(Ordering::Acquire) != NO_BASELINE
    }

    /// Start timing a request: records the start, reports queue and idle
    /// time, and returns the guard that finishes the accounting on drop.
    pub fn begin(&self, ctx: &RequestContext) -> TimingGuard<'_> {
        let process_start = self.clock.now();

        if let Some(queued_at) = ctx.queue_start_time() {
            self.emitter
                .gauge(MetricKind::QueueTime, process_start - queued_at, None);
        }

        // Swap so concurrent requests on one instance never report the same gap twice
        let previous_end = self.last_request_end.swap(NO_BASELINE, Ordering::AcqRel);
        if previous_end != NO_BASELINE {
            let idle = process_start - f64::from_bits(previous_end);
            self.emitter.gauge(MetricKind::Idle, idle, None);
        }

        TimingGuard {
            timing: self,
            ctx: ctx.clone(),
            process_start,
            response: ResponseFacts::default(),
        }
    }

    /// Time a synchronous handler.
    ///
    /// `describe` turns whatever the handler returned (including an error
    /// value) into response facts. A panicking handler still gets its
    /// accounting; the panic continues unwinding afterwards.
    pub fn call<R, F, G>(&self, ctx: &RequestContext, handler: F, describe: G) -> R
    where
        F: FnOnce() -> R,
        G: FnOnce(&R) -> ResponseFacts,
    {
        let mut guard = self.begin(ctx);
        let result = handler();
        guard.observe(describe(&result));
        result
    }

    fn finish(&self, guard: &mut TimingGuard<'_>) {
        let ctx = &guard.ctx;
        let route = self
            .classifier
            .classify(ctx.dispatch().as_deref(), ctx.path());

        let request_time = ctx.take_request_time();
        // Not clamped: a negative value points at an ordering bug upstream
        let middleware_time = (self.clock.now() - guard.process_start) - request_time;

        self.emitter
            .gauge(MetricKind::Request, request_time, Some(&route));

        let bucket = ApdexBucket::classify(
            request_time,
            self.emitter.config().satisfied_threshold(),
        );
        self.emitter.apdex(bucket, request_time);

        if guard.response.status.is_some_and(|s| s >= 500) {
            self.emitter.increment(MetricKind::Error, Some(&route));
        }

        if let Some(size) = guard.response.response_size() {
            self.emitter
                .gauge(MetricKind::ResponseSize, size as f64, Some(&route));
        }

        self.emitter
            .gauge(MetricKind::Middleware, middleware_time, None);

        tracing::trace!(
            %route,
            request_time,
            middleware_time,
            status = ?guard.response.status,
            "request timed"
        );

        self.last_request_end
            .store(self.clock.now().to_bits(), Ordering::Release);
    }
}

// ─── Guard ───────────────────────────────────────────────────────

/// Finishes a request's accounting when dropped.
///
/// Dropping happens on normal return, while a panic unwinds through the
/// handler, and when the request future is cancelled; the accounting runs
/// with whatever response facts were observed by then.
pub struct TimingGuard<'a> {
    timing: &'a RequestTiming,
    ctx: RequestContext,
    process_start: f64,
    response: ResponseFacts,
}

impl TimingGuard<'_> {
    pub fn observe(&mut self, facts: ResponseFacts) {
        self.response = facts;
    }

    /// Run the accounting now rather than at scope end.
    pub fn finish(self) {}
}

impl Drop for TimingGuard<'_> {
    fn drop(&mut self) {
        let timing = self.timing;
        timing.finish(self);
    }
}

// ─── Response facts ──────────────────────────────────────────────

/// What the accounting needs to know about a produced response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseFacts {
    /// `None` when the handler failed before producing a response.
    pub status: Option<u16>,
    /// Raw `Content-Length` header value.
    pub content_length: Option<String>,
    /// Byte length of the body when it is a single known-size chunk.
    pub single_chunk_len: Option<u64>,
}

impl ResponseFacts {
    pub fn status(status: u16) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn from_response<B: HttpBody>(response: &Response<B>) -> Self {
        Self {
            status: Some(response.status().as_u16()),
            content_length: response
                .headers()
                .get(header::CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned),
            single_chunk_len: response.body().size_hint().exact(),
        }
    }

    /// A declared, parsable content length wins; otherwise the single
    /// chunk length; multi-chunk bodies have no size.
    pub fn response_size(&self) -> Option<u64> {
        self.content_length
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .and_then(|v| v.parse().ok())
            .or(self.single_chunk_len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::RecordingSink;
    use crate::timing::clock::ManualClock;
    use crate::timing::route::Endpoint;
    use axum::http::Method;
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use std::thread;

    const T0: f64 = 1_700_000_002.0;

    struct Harness {
        timing: RequestTiming,
        sink: Arc<RecordingSink>,
        clock: Arc<ManualClock>,
    }

    fn harness(config: MetricsConfig) -> Harness {
        let sink = Arc::new(RecordingSink::new());
        let clock = Arc::new(ManualClock::new(T0));
        let timing =
            RequestTiming::new(sink.clone(), Arc::new(config)).with_clock(clock.clone());
        Harness {
            timing,
            sink,
            clock,
        }
    }

    fn orders_ctx() -> RequestContext {
        let ctx = RequestContext::new("/orders/1");
        ctx.set_dispatch(Endpoint::new("OrdersController", "show", Method::GET));
        ctx
    }

    /// Handler that spends `app` seconds in the application after `mw`
    /// seconds of surrounding middleware.
    fn serve(h: &Harness, ctx: &RequestContext, mw: f64, app: f64, facts: ResponseFacts) {
        h.timing.call(
            ctx,
            || {
                h.clock.advance(mw + app);
                ctx.record_request_time(app);
            },
            |_| facts,
        );
    }

    #[test]
    fn test_queue_time_from_header() {
        let h = harness(MetricsConfig::all_enabled(0.5));
        let ctx = RequestContext::with_queue_start("/", "1700000000.0");
        serve(&h, &ctx, 0.0, 0.0, ResponseFacts::status(200));
        assert_eq!(h.sink.gauge_value("web.queue_time"), Some(2.0));
    }

    #[test]
    fn test_implausible_queue_start_emits_nothing() {
        let h = harness(MetricsConfig::all_enabled(0.5));
        let ctx = RequestContext::with_queue_start("/", "5");
        serve(&h, &ctx, 0.0, 0.0, ResponseFacts::status(200));
        assert!(!h.sink.contains("web.queue_time"));
    }

    #[test]
    fn test_idle_only_after_a_completed_request() {
        let h = harness(MetricsConfig::all_enabled(0.5));
        assert!(!h.timing.has_idle_baseline());

        serve(&h, &orders_ctx(), 0.01, 0.1, ResponseFacts::status(200));
        assert!(!h.sink.contains("web.idle"));
        assert!(h.timing.has_idle_baseline());

        h.clock.advance(3.0);
        serve(&h, &orders_ctx(), 0.01, 0.1, ResponseFacts::status(200));
        assert_eq!(h.sink.count("web.idle"), 1);
        let idle = h.sink.gauge_value("web.idle").unwrap();
        assert!((idle - 3.0).abs() < 1e-6, "idle {idle}");
    }

    #[test]
    fn test_fresh_instance_never_reports_idle() {
        let h = harness(MetricsConfig::all_enabled(0.5));
        serve(&h, &orders_ctx(), 0.0, 0.0, ResponseFacts::status(200));

        let other = RequestTiming::new(h.sink.clone(), Arc::new(MetricsConfig::all_enabled(0.5)))
            .with_clock(h.clock.clone());
        h.sink.clear();
        other.call(&orders_ctx(), || (), |_| ResponseFacts::status(200));
        assert!(!h.sink.contains("web.idle"));
    }

    #[test]
    fn test_middleware_is_wall_minus_application() {
        let h = harness(MetricsConfig::all_enabled(0.5));
        serve(&h, &orders_ctx(), 0.25, 1.0, ResponseFacts::status(200));

        assert_eq!(h.sink.gauge_value("web.request"), Some(1.0));
        assert_eq!(
            h.sink.gauge_value("web.request.orders_controller.show.get"),
            Some(1.0)
        );
        let mw = h.sink.gauge_value("web.middleware").unwrap();
        assert!((mw - 0.25).abs() < 1e-6, "middleware {mw}");
        assert!(!h.sink.contains("web.middleware.orders_controller.show.get"));
    }

    #[test]
    fn test_negative_middleware_time_reported_as_is() {
        let h = harness(MetricsConfig::all_enabled(0.5));
        let ctx = orders_ctx();
        // Application claims more time than the wall clock saw
        h.timing.call(&ctx, || ctx.record_request_time(0.5), |_| ResponseFacts::status(200));
        assert_eq!(h.sink.gauge_value("web.middleware"), Some(-0.5));
    }

    #[test]
    fn test_request_time_cleared_after_request() {
        let h = harness(MetricsConfig::all_enabled(0.5));
        let ctx = orders_ctx();
        serve(&h, &ctx, 0.0, 0.3, ResponseFacts::status(200));
        assert!(!ctx.request_time_is_set());

        // Field never set at all
        let ctx = orders_ctx();
        h.timing.call(&ctx, || (), |_| ResponseFacts::status(200));
        assert!(!ctx.request_time_is_set());
        assert_eq!(h.sink.gauge_value("web.request"), Some(0.0));
    }

    #[test]
    fn test_error_increment_only_for_5xx() {
        let h = harness(MetricsConfig::all_enabled(0.5));
        serve(&h, &orders_ctx(), 0.0, 0.0, ResponseFacts::status(200));
        assert!(!h.sink.contains("web.error"));

        serve(&h, &orders_ctx(), 0.0, 0.0, ResponseFacts::status(503));
        assert_eq!(h.sink.count("web.error"), 1);
        assert_eq!(h.sink.count("web.error.orders_controller.show.get"), 1);
    }

    #[test]
    fn test_apdex_bucket_for_request_time() {
        let h = harness(MetricsConfig::all_enabled(0.5));
        serve(&h, &orders_ctx(), 0.0, 1.9, ResponseFacts::status(200));
        assert_eq!(h.sink.gauge_value("web.apdex.tolerated"), Some(1.9));
        assert!(!h.sink.contains("web.apdex.satisfied"));
        assert!(!h.sink.contains("web.apdex.frustrated"));
    }

    #[test]
    fn test_response_size_sources() {
        let h = harness(MetricsConfig::all_enabled(0.5));

        let declared = ResponseFacts {
            status: Some(200),
            content_length: Some("1024".into()),
            single_chunk_len: Some(7),
        };
        serve(&h, &orders_ctx(), 0.0, 0.0, declared);
        assert_eq!(h.sink.gauge_value("web.response_size"), Some(1024.0));

        h.sink.clear();
        let chunk = ResponseFacts {
            status: Some(200),
            content_length: Some("  ".into()),
            single_chunk_len: Some(7),
        };
        serve(&h, &orders_ctx(), 0.0, 0.0, chunk);
        assert_eq!(
            h.sink.gauge_value("web.response_size.orders_controller.show.get"),
            Some(7.0)
        );

        h.sink.clear();
        serve(&h, &orders_ctx(), 0.0, 0.0, ResponseFacts::status(200));
        assert!(!h.sink.contains("web.response_size"));
    }

    #[test]
    fn test_disabled_kinds_stay_silent() {
        let mut config = MetricsConfig::all_enabled(0.5);
        config.request_timing.request.enabled = false;
        config.request_timing.middleware.enabled = false;
        config.request_timing.apdex.enabled = false;
        let h = harness(config);

        serve(&h, &orders_ctx(), 0.1, 0.1, ResponseFacts::status(200));
        let names = h.sink.names();
        assert!(names.iter().all(|n| !n.starts_with("web.request")), "{names:?}");
        assert!(names.iter().all(|n| !n.starts_with("web.middleware")), "{names:?}");
        assert!(names.iter().all(|n| !n.starts_with("web.apdex")), "{names:?}");
    }

    #[test]
    fn test_unrouted_request_uses_fallback_bucket() {
        let h = harness(MetricsConfig::all_enabled(0.5));
        serve(&h, &RequestContext::new("/favicon.ico"), 0.0, 0.0, ResponseFacts::status(404));
        assert!(h.sink.contains("web.request.unknown_endpoint"));

        serve(&h, &RequestContext::new("/assets/app.js"), 0.0, 0.0, ResponseFacts::status(200));
        assert!(h.sink.contains("web.request.assets"));
    }

    #[test]
    fn test_panicking_handler_still_accounted() {
        let h = harness(MetricsConfig::all_enabled(0.5));
        let ctx = orders_ctx();

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            h.timing.call(
                &ctx,
                || -> () {
                    h.clock.advance(0.4);
                    ctx.record_request_time(0.3);
                    panic!("handler blew up");
                },
                |_| ResponseFacts::status(200),
            )
        }));

        let payload = outcome.unwrap_err();
        assert_eq!(payload.downcast_ref::<&str>(), Some(&"handler blew up"));
        assert_eq!(h.sink.gauge_value("web.request"), Some(0.3));
        assert!(h.sink.contains("web.middleware"));
        assert!(h.sink.contains("web.apdex.satisfied"));
        // No status was observed, so no error increment and no size
        assert!(!h.sink.contains("web.error"));
        assert!(!h.sink.contains("web.response_size"));
        assert!(!ctx.request_time_is_set());
        assert!(h.timing.has_idle_baseline());
    }

    #[test]
    fn test_error_result_passes_through() {
        let h = harness(MetricsConfig::all_enabled(0.5));
        let result: Result<(), &str> = h.timing.call(
            &orders_ctx(),
            || Err("upstream refused"),
            |r| match r {
                Ok(()) => ResponseFacts::status(200),
                Err(_) => ResponseFacts::status(502),
            },
        );
        assert_eq!(result, Err("upstream refused"));
        assert_eq!(h.sink.count("web.error"), 1);
    }

    #[test]
    fn test_idle_reported_when_clock_starts_at_zero() {
        let sink = Arc::new(RecordingSink::new());
        let clock = Arc::new(ManualClock::new(0.0));
        let timing = RequestTiming::new(sink.clone(), Arc::new(MetricsConfig::all_enabled(0.5)))
            .with_clock(clock.clone());

        timing.call(&orders_ctx(), || (), |_| ResponseFacts::status(200));
        assert!(timing.has_idle_baseline());

        clock.advance(2.0);
        timing.call(&orders_ctx(), || (), |_| ResponseFacts::status(200));
        assert_eq!(sink.gauge_value("web.idle"), Some(2.0));
    }

    #[test]
    fn test_shared_instance_consumes_each_end_time_once() {
        const THREADS: usize = 8;
        const PER_THREAD: usize = 250;

        let sink = Arc::new(RecordingSink::new());
        let timing = RequestTiming::new(sink.clone(), Arc::new(MetricsConfig::all_enabled(0.5)));

        thread::scope(|scope| {
            for _ in 0..THREADS {
                scope.spawn(|| {
                    for _ in 0..PER_THREAD {
                        let ctx = orders_ctx();
                        timing.call(&ctx, || ctx.record_request_time(0.0), |_| {
                            ResponseFacts::status(200)
                        });
                    }
                });
            }
        });

        let requests = sink.count("web.request");
        let idle = sink.count("web.idle");
        assert_eq!(requests, THREADS * PER_THREAD);
        // The first request has no baseline; after that every gap is
        // reported by at most one request
        assert!(idle < requests, "requests={requests} idle={idle}");
        assert!(idle > 0);
        assert!(timing.has_idle_baseline());
    }

    #[test]
    fn test_custom_asset_prefixes() {
        let sink = Arc::new(RecordingSink::new());
        let timing = RequestTiming::new(sink.clone(), Arc::new(MetricsConfig::all_enabled(0.5)))
            .with_classifier(RouteClassifier::with_asset_prefixes(["/static/", "/packs/"]));

        for path in ["/static/app.css", "/packs/app.js", "/assets/app.js"] {
            timing.call(&RequestContext::new(path), || (), |_| ResponseFacts::status(200));
        }
        assert_eq!(sink.count("web.request.assets"), 2);
        assert_eq!(sink.count("web.request.unknown_endpoint"), 1);
    }
}

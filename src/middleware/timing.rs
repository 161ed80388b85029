//! axum adapters for [`RequestTiming`].
//!
//! Two layers cooperate:
//!
//! - [`request_timing`] sits at the outer edge of the stack. It creates the
//!   [`RequestContext`], times the whole request and emits every metric.
//! - [`application_timing`] sits innermost (as a `route_layer`, so the
//!   matched route is known). It records the handler's own time and a
//!   fallback dispatch target into the context.
//!
//! Handlers can name themselves more precisely by pulling the context out
//! with `Extension<RequestContext>` and calling `set_dispatch`.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{MatchedPath, Request},
    middleware::{self, Next},
    response::Response,
    Router,
};

use crate::timing::context::RequestContext;
use crate::timing::route::MatchedRoute;
use crate::timing::{RequestTiming, ResponseFacts};

/// Outer middleware: full request accounting.
pub async fn request_timing(timing: Arc<RequestTiming>, mut req: Request, next: Next) -> Response {
    let ctx = RequestContext::from_headers(req.uri().path(), req.headers());
    req.extensions_mut().insert(ctx.clone());

    // Dropped on every exit path, unwinding and cancellation included
    let mut guard = timing.begin(&ctx);
    let response = next.run(req).await;
    guard.observe(ResponseFacts::from_response(&response));
    guard.finish();

    response
}

/// Inner middleware: reports the application's own processing time.
pub async fn application_timing(req: Request, next: Next) -> Response {
    let Some(ctx) = req.extensions().get::<RequestContext>().cloned() else {
        return next.run(req).await;
    };

    if let Some(path) = req.extensions().get::<MatchedPath>() {
        ctx.set_dispatch_if_absent(MatchedRoute::from_matched_path(path, req.method()));
    }

    let _timer = ApplicationTimer {
        ctx,
        start: Instant::now(),
    };
    next.run(req).await
}

/// Writes the elapsed application time into the context when dropped.
struct ApplicationTimer {
    ctx: RequestContext,
    start: Instant,
}

impl Drop for ApplicationTimer {
    fn drop(&mut self) {
        self.ctx
            .record_request_time(self.start.elapsed().as_secs_f64());
    }
}

/// Extension trait wiring both layers onto a router.
pub trait TimedRouter {
    /// Time every request handled by this router.
    ///
    /// Call after all routes are added: the application layer only covers
    /// routes registered before it.
    fn with_request_timing(self, timing: Arc<RequestTiming>) -> Self;
}

impl<S> TimedRouter for Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn with_request_timing(self, timing: Arc<RequestTiming>) -> Self {
        self.route_layer(middleware::from_fn(application_timing))
            .layer(middleware::from_fn(move |req, next| {
                request_timing(timing.clone(), req, next)
            }))
    }
}

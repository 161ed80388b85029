use axum::{
    extract::FromRef,
    routing::{get, post},
    Router,
};
use redis::aio::ConnectionManager;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

use crate::handlers;
use crate::metrics::{dashboard, MetricsCollector};
use crate::middleware::timing::TimedRouter;
use crate::reporters::{ExternalService, TimedConnection};
use crate::timing::RequestTiming;

/// Shared application state available to every handler via `State<AppState>`.
#[derive(Clone)]
pub struct AppState {
    /// In-process metrics backend read by the dashboard endpoints.
    pub collector: Arc<MetricsCollector>,

    /// Timed wrapper for outbound service calls.
    pub external: ExternalService,

    /// Timed redis connection, when one was configured.
    pub cache: Option<TimedConnection<ConnectionManager>>,
}

impl FromRef<AppState> for Arc<MetricsCollector> {
    fn from_ref(state: &AppState) -> Self {
        state.collector.clone()
    }
}

/// Builds the full Axum `Router` with all routes, timing layers, and static serving.
pub fn create_router(state: AppState, timing: Arc<RequestTiming>, static_dir: &str) -> Router {
    Router::new()
        // ── Order endpoints ─────────────────────────────────────
        .route("/api/orders/:id", get(handlers::orders::show))
        .route("/api/orders", post(handlers::orders::create))
        // ── Cache endpoint ──────────────────────────────────────
        .route("/api/cache/:key", get(handlers::cache::get_entry))
        // ── Always 500 ──────────────────────────────────────────
        .route("/api/boom", get(handlers::boom))
        // ── Metrics ─────────────────────────────────────────────
        .route("/api/metrics", get(dashboard::snapshot))
        .route("/api/metrics/stream", get(dashboard::snapshot_stream))
        // ── Provide shared state to all routes above ────────────
        .with_state(state)
        // ── Serve static/ directory; unmatched → "assets" / "unknown_endpoint"
        .fallback_service(ServeDir::new(static_dir))
        // ── Timing wraps everything below the CORS layer ────────
        .with_request_timing(timing)
        .layer(CorsLayer::permissive())
}

//! Request timing instrumentation for axum services.
//!
//! Splits each request's wall time into queue wait, application time,
//! middleware overhead and inter-request idle time, scores it for apdex,
//! and forwards the results as `web.*` gauges and counters to a
//! [`MetricsSink`](metrics::MetricsSink), optionally duplicated per route.
//!
//! ```ignore
//! let config = Arc::new(MetricsConfig::load("config/request_timing.yaml")?);
//! let timing = Arc::new(RequestTiming::new(Arc::new(TracingSink), config));
//! let app = Router::new()
//!     .route("/orders/:id", get(show))
//!     .with_request_timing(timing);
//! ```

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod redis_client;
pub mod reporters;
pub mod server;
pub mod timing;

pub use config::MetricsConfig;
pub use error::{Error, Result};
pub use metrics::{MetricEmitter, MetricKind, MetricsSink};
pub use middleware::timing::TimedRouter;
pub use timing::context::RequestContext;
pub use timing::route::{DispatchTarget, Endpoint, MatchedRoute, RouteClassifier};
pub use timing::{RequestTiming, ResponseFacts, TimingGuard};

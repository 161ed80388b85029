use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use request_timing::metrics::{FanoutSink, MetricsCollector, MetricsSink, TracingSink};
use request_timing::reporters::{ExternalService, TimedConnection};
use request_timing::server::{self, AppState};
use request_timing::{redis_client, MetricsConfig, RequestTiming};

/// Demo server instrumented with request timing
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Metric toggles file
    #[arg(short, long, default_value = "config/request_timing.yaml")]
    config: PathBuf,
    /// Address to listen on
    #[arg(short, long, default_value = "0.0.0.0:3000")]
    bind: String,
    /// Redis URL; `/api/cache/:key` answers 503 without one
    #[arg(short, long)]
    redis_url: Option<String>,
    /// Directory served for unmatched paths
    #[arg(long, default_value = "static")]
    static_dir: String,
    /// Log every measurement
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> request_timing::Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    // ── 1. Load metric toggles ───────────────────────────────────
    let config = Arc::new(MetricsConfig::load(&args.config)?);
    info!(path = %args.config.display(), "loaded metrics configuration");

    // ── 2. Metrics backend ──────────────────────────────────────
    let collector = Arc::new(MetricsCollector::new());
    let sink: Arc<dyn MetricsSink> = Arc::new(
        FanoutSink::new()
            .with(collector.clone())
            .with(Arc::new(TracingSink)),
    );

    // ── 3. Optional redis ───────────────────────────────────────
    let cache = match &args.redis_url {
        Some(url) => {
            let manager = redis_client::connect(url).await?;
            Some(TimedConnection::new(manager, sink.clone(), config.clone()))
        }
        None => None,
    };

    // ── 4. Build state + router ─────────────────────────────────
    let state = AppState {
        collector,
        external: ExternalService::new(sink.clone(), config.clone()),
        cache,
    };
    let timing = Arc::new(RequestTiming::new(sink, config));
    let app = server::create_router(state, timing, &args.static_dir);

    // ── 5. Bind & serve ─────────────────────────────────────────
    let listener = tokio::net::TcpListener::bind(&args.bind).await?;
    info!(addr = %args.bind, "listening");
    info!("metrics JSON → /api/metrics, SSE → /api/metrics/stream");

    axum::serve(listener, app).await?;
    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

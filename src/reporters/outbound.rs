use std::future::Future;
use std::sync::Arc;

use crate::config::MetricsConfig;
use crate::metrics::MetricsSink;

use super::ElapsedReport;

pub const OUTGOING_REQUEST: &str = "outgoing_request";

/// Await `fut`, reporting its duration under `name` when `enabled`.
pub async fn timed<F: Future>(
    sink: &dyn MetricsSink,
    name: &str,
    enabled: bool,
    fut: F,
) -> F::Output {
    let names = if enabled {
        vec![name.to_owned()]
    } else {
        Vec::new()
    };
    let _report = ElapsedReport::new(sink, names);
    fut.await
}

/// Times calls to external HTTP services as `outgoing_request`.
#[derive(Clone)]
pub struct ExternalService {
    sink: Arc<dyn MetricsSink>,
    config: Arc<MetricsConfig>,
}

impl ExternalService {
    pub fn new(sink: Arc<dyn MetricsSink>, config: Arc<MetricsConfig>) -> Self {
        Self { sink, config }
    }

    pub async fn request<F: Future>(&self, fut: F) -> F::Output {
        let enabled = self.config.external_service.request.enabled;
        timed(self.sink.as_ref(), OUTGOING_REQUEST, enabled, fut).await
    }
}

use std::sync::Arc;

use crate::config::MetricsConfig;
use crate::timing::apdex::ApdexBucket;

use super::{MetricKind, MetricsSink, WEB_PREFIX};

/// Config-gated front of the sink.
///
/// A disabled kind is a complete no-op: neither the base name nor the
/// route-qualified duplicate reaches the sink.
#[derive(Clone)]
pub struct MetricEmitter {
    sink: Arc<dyn MetricsSink>,
    config: Arc<MetricsConfig>,
}

impl MetricEmitter {
    pub fn new(sink: Arc<dyn MetricsSink>, config: Arc<MetricsConfig>) -> Self {
        Self { sink, config }
    }

    pub fn config(&self) -> &MetricsConfig {
        &self.config
    }

    /// Forward `web.<kind>` and, with route tracking on, `web.<kind>.<route>`.
    pub fn gauge(&self, kind: MetricKind, value: f64, route: Option<&str>) {
        if !self.config.enabled(kind) {
            return;
        }
        self.sink.gauge(&base_name(kind), value);
        if let Some(route) = self.tracked(route) {
            self.sink.gauge(&route_name(kind, route), value);
        }
    }

    pub fn increment(&self, kind: MetricKind, route: Option<&str>) {
        if !self.config.enabled(kind) {
            return;
        }
        self.sink.increment(&base_name(kind));
        if let Some(route) = self.tracked(route) {
            self.sink.increment(&route_name(kind, route));
        }
    }

    /// `web.apdex.<bucket>` carrying the raw request time, not a count.
    pub fn apdex(&self, bucket: ApdexBucket, request_time: f64) {
        if !self.config.enabled(MetricKind::Apdex) {
            return;
        }
        self.sink
            .gauge(&route_name(MetricKind::Apdex, bucket.as_str()), request_time);
    }

    fn tracked<'a>(&self, route: Option<&'a str>) -> Option<&'a str> {
        route.filter(|_| self.config.route_tracking())
    }
}

fn base_name(kind: MetricKind) -> String {
    format!("{WEB_PREFIX}.{kind}")
}

fn route_name(kind: MetricKind, suffix: &str) -> String {
    format!("{WEB_PREFIX}.{kind}.{suffix}")
}

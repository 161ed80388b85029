use std::sync::Arc;

use redis::aio::ConnectionLike;
use redis::{Arg, Cmd, Pipeline, RedisFuture, Value};

use crate::config::MetricsConfig;
use crate::metrics::MetricsSink;

use super::ElapsedReport;

pub const CACHE_METRIC: &str = "cache.command";

/// Redis connection wrapper that times every round-trip.
///
/// Reports `cache.command` for all commands and, when enabled,
/// `cache.command.<name>` per command (`get`, `hgetall`, `pipeline`...).
/// Works with anything implementing `ConnectionLike`, so
/// `redis::AsyncCommands` is available on it as usual.
#[derive(Clone)]
pub struct TimedConnection<C> {
    inner: C,
    sink: Arc<dyn MetricsSink>,
    config: Arc<MetricsConfig>,
}

impl<C> TimedConnection<C> {
    pub fn new(inner: C, sink: Arc<dyn MetricsSink>, config: Arc<MetricsConfig>) -> Self {
        Self {
            inner,
            sink,
            config,
        }
    }

    fn metric_names(&self, command: &str) -> Vec<String> {
        let cache = &self.config.cache;
        let mut names = Vec::with_capacity(2);
        if cache.command.enabled {
            names.push(CACHE_METRIC.to_owned());
        }
        if cache.command_specific.enabled {
            names.push(format!("{CACHE_METRIC}.{command}"));
        }
        names
    }
}

impl<C: ConnectionLike + Send> ConnectionLike for TimedConnection<C> {
    fn req_packed_command<'a>(&'a mut self, cmd: &'a Cmd) -> RedisFuture<'a, Value> {
        let names = self.metric_names(&command_name(cmd));
        Box::pin(async move {
            let _report = ElapsedReport::new(self.sink.as_ref(), names);
            self.inner.req_packed_command(cmd).await
        })
    }

    fn req_packed_commands<'a>(
        &'a mut self,
        cmd: &'a Pipeline,
        offset: usize,
        count: usize,
    ) -> RedisFuture<'a, Vec<Value>> {
        let names = self.metric_names("pipeline");
        Box::pin(async move {
            let _report = ElapsedReport::new(self.sink.as_ref(), names);
            self.inner.req_packed_commands(cmd, offset, count).await
        })
    }

    fn get_db(&self) -> i64 {
        self.inner.get_db()
    }
}

/// Lowercased first argument of a command, `unknown` if there is none.
fn command_name(cmd: &Cmd) -> String {
    match cmd.args_iter().next() {
        Some(Arg::Simple(name)) => String::from_utf8_lossy(name).to_ascii_lowercase(),
        _ => "unknown".to_owned(),
    }
}

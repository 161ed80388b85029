//! Read side of [`MetricsCollector`]: a JSON snapshot and a live feed.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use serde::Deserialize;
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::{Stream, StreamExt};

use super::collector::{MetricsCollector, MetricsSnapshot};

/// How often the feed checks the collector for new measurements.
const POLL: Duration = Duration::from_millis(500);

#[derive(Debug, Default, Deserialize)]
pub struct SnapshotQuery {
    /// Only series whose name starts with this, e.g. `web.request`.
    pub prefix: Option<String>,
}

/// `GET /api/metrics[?prefix=..]`
pub async fn snapshot(
    State(collector): State<Arc<MetricsCollector>>,
    Query(query): Query<SnapshotQuery>,
) -> Json<MetricsSnapshot> {
    Json(collector.snapshot_matching(query.prefix.as_deref()))
}

/// `GET /api/metrics/stream[?prefix=..]`
///
/// Sends a `snapshot` event whenever something was recorded since the
/// last one, with the collector version as the event id. Quiet periods
/// only produce keep-alives.
pub async fn snapshot_stream(
    State(collector): State<Arc<MetricsCollector>>,
    Query(query): Query<SnapshotQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut sent = None;

    let events = IntervalStream::new(tokio::time::interval(POLL)).filter_map(move |_| {
        let version = collector.version();
        if sent == Some(version) {
            return None;
        }
        sent = Some(version);
        snapshot_event(&collector.snapshot_matching(query.prefix.as_deref())).map(Ok)
    });

    Sse::new(events).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

fn snapshot_event(snapshot: &MetricsSnapshot) -> Option<Event> {
    match Event::default()
        .event("snapshot")
        .id(snapshot.version.to_string())
        .json_data(snapshot)
    {
        Ok(event) => Some(event),
        Err(err) => {
            tracing::warn!(%err, "could not encode metrics snapshot");
            None
        }
    }
}

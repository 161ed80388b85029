use std::collections::{BTreeMap, VecDeque};
use std::time::Instant;

use hdrhistogram::Histogram;
use parking_lot::Mutex;
use serde::Serialize;

use super::{MetricKind, MetricValue, MetricsSink, WEB_PREFIX};

// ─── Configuration ───────────────────────────────────────────────

/// How many individual measurements we keep for the live feed
const MAX_RECENT: usize = 200;

/// HdrHistogram precision; histograms auto-resize to whatever range shows up
const HIST_SIGFIG: u8 = 3;

// ─── Public types ────────────────────────────────────────────────

/// In-process metrics backend.
/// The timing layer pushes gauges and increments, the dashboard endpoints
/// read snapshots.
pub struct MetricsCollector {
    inner: Mutex<Inner>,
}

/// Unit a gauge series arrives in. Every figure in its summary uses it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    Seconds,
    Bytes,
}

impl Unit {
    /// Histogram ticks per unit; seconds are bucketed at microsecond resolution.
    fn ticks(self) -> f64 {
        match self {
            Self::Seconds => 1_000_000.0,
            Self::Bytes => 1.0,
        }
    }

    fn for_name(name: &str) -> Self {
        let kind = name.strip_prefix(WEB_PREFIX).and_then(|rest| rest.strip_prefix('.'));
        match kind {
            Some(k) if k.starts_with(MetricKind::ResponseSize.as_str()) => Self::Bytes,
            _ => Self::Seconds,
        }
    }
}

/// One entry in the live feed.
#[derive(Debug, Clone, Serialize)]
pub struct RecentMeasurement {
    pub timestamp_ms: u64,
    pub name: String,
    pub value: MetricValue,
}

#[derive(Debug, Clone, Serialize)]
pub struct GaugeSummary {
    pub name: String,
    pub unit: Unit,
    pub last: f64,
    pub sum: f64,
    pub count: u64,
    /// Observations below zero (clock jitter on middleware time).
    /// The histogram records them as its lowest bucket.
    pub negative: u64,
    pub distribution: Distribution,
}

/// Spread of one series, in the series' own unit.
///
/// Values come back from histogram buckets, so they carry the
/// histogram's precision rather than the exact observations.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Distribution {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CounterSummary {
    pub name: String,
    pub count: u64,
}

/// Complete snapshot shipped to the dashboard on every SSE tick.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// Bumped by every recorded measurement.
    pub version: u64,
    pub elapsed_secs: f64,
    pub total_requests: u64,
    pub requests_per_sec: f64,
    pub gauges: Vec<GaugeSummary>,
    pub counters: Vec<CounterSummary>,
    pub recent: Vec<RecentMeasurement>,
}

// ─── Internal state ──────────────────────────────────────────────

struct Inner {
    gauges: BTreeMap<String, Series>,
    counters: BTreeMap<String, u64>,
    recent: VecDeque<RecentMeasurement>,
    version: u64,
    // Wall-clock anchor for elapsed time
    start_time: Option<Instant>,
}

struct Series {
    unit: Unit,
    hist: Histogram<u64>,
    last: f64,
    sum: f64,
    count: u64,
    negative: u64,
}

// ─── MetricsCollector impl ───────────────────────────────────────

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::new()),
        }
    }

    /// Wipe all data.
    pub fn reset(&self) {
        *self.inner.lock() = Inner::new();
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.inner.lock().snapshot(None)
    }

    /// Snapshot restricted to series and feed entries whose name starts
    /// with `prefix`. Request totals always cover every request.
    pub fn snapshot_matching(&self, prefix: Option<&str>) -> MetricsSnapshot {
        self.inner.lock().snapshot(prefix)
    }

    pub fn version(&self) -> u64 {
        self.inner.lock().version
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSink for MetricsCollector {
    fn gauge(&self, name: &str, value: f64) {
        self.inner.lock().record_gauge(name, value);
    }

    fn increment(&self, name: &str) {
        self.inner.lock().record_increment(name);
    }
}

// ─── Inner impl ──────────────────────────────────────────────────

impl Inner {
    fn new() -> Self {
        Self {
            gauges: BTreeMap::new(),
            counters: BTreeMap::new(),
            recent: VecDeque::with_capacity(MAX_RECENT + 1),
            version: 0,
            start_time: None,
        }
    }

    /// Bump the version and return ms since the first measurement.
    fn touch(&mut self) -> u64 {
        self.version += 1;
        // Lazily set the anchor on the very first measurement
        let start = *self.start_time.get_or_insert_with(Instant::now);
        start.elapsed().as_millis() as u64
    }

    fn record_gauge(&mut self, name: &str, value: f64) {
        let timestamp_ms = self.touch();

        let series = self
            .gauges
            .entry(name.to_owned())
            .or_insert_with(|| Series::new(Unit::for_name(name)));
        series.record(value);

        self.push_recent(RecentMeasurement {
            timestamp_ms,
            name: name.to_owned(),
            value: MetricValue::Gauge(value),
        });
    }

    fn record_increment(&mut self, name: &str) {
        let timestamp_ms = self.touch();
        *self.counters.entry(name.to_owned()).or_insert(0) += 1;
        self.push_recent(RecentMeasurement {
            timestamp_ms,
            name: name.to_owned(),
            value: MetricValue::Increment,
        });
    }

    fn push_recent(&mut self, m: RecentMeasurement) {
        self.recent.push_back(m);
        if self.recent.len() > MAX_RECENT {
            self.recent.pop_front();
        }
    }

    fn snapshot(&self, prefix: Option<&str>) -> MetricsSnapshot {
        let keep = |name: &str| prefix.map_or(true, |p| name.starts_with(p));

        let elapsed_secs = self
            .start_time
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0);

        let total_requests = self
            .gauges
            .get(&format!("{WEB_PREFIX}.request"))
            .map(|s| s.count)
            .unwrap_or(0);

        let requests_per_sec = if elapsed_secs > 0.0 {
            total_requests as f64 / elapsed_secs
        } else {
            0.0
        };

        MetricsSnapshot {
            version: self.version,
            elapsed_secs,
            total_requests,
            requests_per_sec,
            gauges: self
                .gauges
                .iter()
                .filter(|(name, _)| keep(name.as_str()))
                .map(|(name, s)| s.summary(name))
                .collect(),
            counters: self
                .counters
                .iter()
                .filter(|(name, _)| keep(name.as_str()))
                .map(|(name, &count)| CounterSummary {
                    name: name.clone(),
                    count,
                })
                .collect(),
            recent: self
                .recent
                .iter()
                .filter(|m| keep(m.name.as_str()))
                .cloned()
                .collect(),
        }
    }
}

impl Series {
    fn new(unit: Unit) -> Self {
        Self {
            unit,
            hist: Histogram::<u64>::new(HIST_SIGFIG).expect("histogram creation"),
            last: 0.0,
            sum: 0.0,
            count: 0,
            negative: 0,
        }
    }

    fn record(&mut self, value: f64) {
        self.last = value;
        self.sum += value;
        self.count += 1;
        if value < 0.0 {
            self.negative += 1;
        }

        // Clamp to ≥ 1 tick; NaN collapses to 1 as well
        let ticks = (value * self.unit.ticks()).round().max(1.0) as u64;
        let _ = self.hist.record(ticks);
    }

    fn distribution(&self) -> Distribution {
        if self.hist.len() == 0 {
            return Distribution::default();
        }
        let per = self.unit.ticks();
        let at = |q: f64| self.hist.value_at_quantile(q) as f64 / per;
        Distribution {
            min: self.hist.min() as f64 / per,
            max: self.hist.max() as f64 / per,
            mean: self.hist.mean() / per,
            p50: at(0.50),
            p95: at(0.95),
            p99: at(0.99),
        }
    }

    fn summary(&self, name: &str) -> GaugeSummary {
        GaugeSummary {
            name: name.to_owned(),
            unit: self.unit,
            last: self.last,
            sum: self.sum,
            count: self.count,
            negative: self.negative,
            distribution: self.distribution(),
        }
    }
}

use hdrhistogram::Histogram;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use crate::registry::Registry;
use crate::tags::TagSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum MetricKind {
    Counter,
    Gauge,
    Rate,
    Trend,
}

#[derive(Debug, Clone)]
pub struct MetricSeriesSummary {
    pub name: String,
    pub kind: MetricKind,
    pub tags: Vec<(String, String)>,
    pub values: MetricValues,
}

#[derive(Debug, Clone)]
pub enum MetricValues {
    Counter {
        value: f64,
    },
    Gauge {
        value: i64,
    },
    Rate {
        total: u64,
        trues: u64,
        rate: Option<f64>,
    },
    Trend {
        count: u64,
        min: Option<f64>,
        max: Option<f64>,
        avg: Option<f64>,
        p50: Option<f64>,
        p90: Option<f64>,
        p95: Option<f64>,
        p99: Option<f64>,
    },
}

impl MetricValues {
    fn empty(kind: MetricKind) -> Self {
        match kind {
            MetricKind::Counter => MetricValues::Counter { value: 0.0 },
            MetricKind::Gauge => MetricValues::Gauge { value: 0 },
            MetricKind::Rate => MetricValues::Rate {
                total: 0,
                trues: 0,
                rate: None,
            },
            MetricKind::Trend => MetricValues::Trend {
                count: 0,
                min: None,
                max: None,
                avg: None,
                p50: None,
                p90: None,
                p95: None,
                p99: None,
            },
        }
    }
}

/// Trend aggregation: count/sum/min/max as atomics over values scaled by
/// 1000, percentiles from an hdrhistogram with 3 significant figures.
///
/// Values are expected in milliseconds; the scaling keeps sub-millisecond
/// resolution while the histogram stays integer-valued. Percentile error is
/// bounded by the histogram's 3 significant figures (±0.1%).
#[derive(Debug)]
struct TrendAgg {
    count: AtomicU64,
    sum_scaled: AtomicU64,
    min_scaled: AtomicU64,
    max_scaled: AtomicU64,
    hist: Mutex<Histogram<u64>>,
}

impl TrendAgg {
    fn new() -> Self {
        // Scaled upper bound: 1 hour of milliseconds, times 1000.
        let hist = match Histogram::<u64>::new_with_bounds(1, 3_600_000_000, 3) {
            Ok(h) => h,
            Err(err) => panic!("failed to init histogram: {err}"),
        };
        Self {
            count: AtomicU64::new(0),
            sum_scaled: AtomicU64::new(0),
            min_scaled: AtomicU64::new(u64::MAX),
            max_scaled: AtomicU64::new(0),
            hist: Mutex::new(hist),
        }
    }

    fn record(&self, value: f64) {
        if !value.is_finite() {
            return;
        }
        let scaled = (value * 1000.0).round();
        if scaled <= 0.0 {
            return;
        }
        let scaled = scaled as u64;

        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum_scaled.fetch_add(scaled, Ordering::Relaxed);

        atomic_min(&self.min_scaled, scaled);
        atomic_max(&self.max_scaled, scaled);

        let mut h = self.hist.lock();
        let _ = h.record(scaled);
    }

    fn summarize(&self) -> MetricValues {
        let count = self.count.load(Ordering::Relaxed);
        if count == 0 {
            return MetricValues::empty(MetricKind::Trend);
        }

        let sum = self.sum_scaled.load(Ordering::Relaxed) as f64;
        let min = self.min_scaled.load(Ordering::Relaxed);
        let max = self.max_scaled.load(Ordering::Relaxed);

        let h = self.hist.lock();
        #[allow(clippy::len_zero)]
        let (p50, p90, p95, p99) = if h.len() == 0 {
            (None, None, None, None)
        } else {
            (
                Some(h.value_at_quantile(0.50) as f64 / 1000.0),
                Some(h.value_at_quantile(0.90) as f64 / 1000.0),
                Some(h.value_at_quantile(0.95) as f64 / 1000.0),
                Some(h.value_at_quantile(0.99) as f64 / 1000.0),
            )
        };

        MetricValues::Trend {
            count,
            min: Some(min as f64 / 1000.0),
            max: Some(max as f64 / 1000.0),
            avg: Some(sum / (count as f64) / 1000.0),
            p50,
            p90,
            p95,
            p99,
        }
    }
}

fn atomic_min(cell: &AtomicU64, value: u64) {
    let mut cur = cell.load(Ordering::Relaxed);
    while value < cur {
        match cell.compare_exchange_weak(cur, value, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => break,
            Err(observed) => cur = observed,
        }
    }
}

fn atomic_max(cell: &AtomicU64, value: u64) {
    let mut cur = cell.load(Ordering::Relaxed);
    while value > cur {
        match cell.compare_exchange_weak(cur, value, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => break,
            Err(observed) => cur = observed,
        }
    }
}

#[derive(Debug, Default)]
struct CounterAgg {
    value: Mutex<f64>,
}

impl CounterAgg {
    fn add(&self, v: f64) {
        if !v.is_finite() {
            return;
        }
        let mut guard = self.value.lock();
        *guard += v;
    }

    fn get(&self) -> f64 {
        *self.value.lock()
    }
}

#[derive(Debug, Default)]
struct GaugeAgg {
    value: AtomicI64,
}

impl GaugeAgg {
    fn set(&self, v: i64) {
        self.value.store(v, Ordering::Relaxed);
    }

    fn add(&self, v: i64) -> i64 {
        self.value.fetch_add(v, Ordering::Relaxed).saturating_add(v)
    }

    fn sub(&self, v: i64) {
        self.value.fetch_sub(v, Ordering::Relaxed);
    }

    // CAS loop to keep the max without races.
    fn raise_to(&self, v: i64) {
        let mut cur = self.value.load(Ordering::Relaxed);
        while v > cur {
            match self
                .value
                .compare_exchange_weak(cur, v, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => break,
                Err(observed) => cur = observed,
            }
        }
    }

    fn get(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Default)]
struct RateAgg {
    total: AtomicU64,
    trues: AtomicU64,
}

impl RateAgg {
    fn add(&self, v: bool) {
        self.total.fetch_add(1, Ordering::Relaxed);
        if v {
            self.trues.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn summarize(&self) -> MetricValues {
        let total = self.total.load(Ordering::Relaxed);
        let trues = self.trues.load(Ordering::Relaxed);
        let rate = if total == 0 {
            None
        } else {
            Some(trues as f64 / total as f64)
        };
        MetricValues::Rate { total, trues, rate }
    }
}

#[derive(Debug)]
enum Agg {
    Counter(CounterAgg),
    Gauge(GaugeAgg),
    Rate(RateAgg),
    Trend(TrendAgg),
}

/// One (kind, name, tags) series and its aggregated state.
///
/// Writes of a mismatched shape (e.g. `add_bool` on a counter) are ignored
/// rather than panicking; a load test must not die on a mistyped sample.
#[derive(Debug)]
pub struct Series {
    kind: MetricKind,
    name: Arc<str>,
    tags: TagSet,
    agg: Agg,
}

impl Series {
    pub(crate) fn new(kind: MetricKind, name: Arc<str>, tags: TagSet) -> Self {
        let agg = match kind {
            MetricKind::Counter => Agg::Counter(CounterAgg::default()),
            MetricKind::Gauge => Agg::Gauge(GaugeAgg::default()),
            MetricKind::Rate => Agg::Rate(RateAgg::default()),
            MetricKind::Trend => Agg::Trend(TrendAgg::new()),
        };
        Self {
            kind,
            name,
            tags,
            agg,
        }
    }

    pub fn kind(&self) -> MetricKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add(&self, value: f64) {
        match &self.agg {
            Agg::Counter(c) => c.add(value),
            Agg::Trend(t) => t.record(value),
            Agg::Gauge(_) | Agg::Rate(_) => {}
        }
    }

    pub fn add_bool(&self, value: bool) {
        if let Agg::Rate(r) = &self.agg {
            r.add(value);
        }
    }

    pub fn set_gauge(&self, value: i64) {
        if let Agg::Gauge(g) = &self.agg {
            g.set(value);
        }
    }

    /// Increments the gauge and returns the new value.
    pub fn increment_gauge(&self, value: i64) -> i64 {
        match &self.agg {
            Agg::Gauge(g) => g.add(value),
            _ => 0,
        }
    }

    pub fn decrement_gauge(&self, value: i64) {
        if let Agg::Gauge(g) = &self.agg {
            g.sub(value);
        }
    }

    /// Raises the gauge to `value` if it is currently lower.
    pub fn raise_gauge(&self, value: i64) {
        if let Agg::Gauge(g) = &self.agg {
            g.raise_to(value);
        }
    }

    pub fn gauge_value(&self) -> i64 {
        match &self.agg {
            Agg::Gauge(g) => g.get(),
            _ => 0,
        }
    }

    pub fn counter_value(&self) -> f64 {
        match &self.agg {
            Agg::Counter(c) => c.get(),
            _ => 0.0,
        }
    }

    pub fn rate_totals(&self) -> (u64, u64) {
        match &self.agg {
            Agg::Rate(r) => (
                r.total.load(Ordering::Relaxed),
                r.trues.load(Ordering::Relaxed),
            ),
            _ => (0, 0),
        }
    }

    pub(crate) fn summarize(&self) -> MetricSeriesSummary {
        let values = match &self.agg {
            Agg::Counter(c) => MetricValues::Counter { value: c.get() },
            Agg::Gauge(g) => MetricValues::Gauge { value: g.get() },
            Agg::Rate(r) => r.summarize(),
            Agg::Trend(t) => t.summarize(),
        };

        MetricSeriesSummary {
            name: self.name.to_string(),
            kind: self.kind,
            tags: self.tags.to_pairs(),
            values,
        }
    }
}

/// Write handle for a named metric: records into the untagged base series
/// and, via the `_with_tags` variants, into tagged sub-series as well.
#[derive(Debug, Clone)]
pub struct MetricHandle {
    registry: Arc<Registry>,
    base: Arc<Series>,
}

impl MetricHandle {
    pub(crate) fn new(registry: Arc<Registry>, base: Arc<Series>) -> Self {
        Self { registry, base }
    }

    pub fn kind(&self) -> MetricKind {
        self.base.kind()
    }

    pub fn add(&self, value: f64) {
        self.base.add(value);
    }

    pub fn add_with_tags(&self, value: f64, tags: &[(String, String)]) {
        self.base.add(value);
        if tags.is_empty() {
            return;
        }
        self.registry
            .series(self.base.kind, &self.base.name, tags)
            .add(value);
    }

    pub fn add_bool(&self, value: bool) {
        self.base.add_bool(value);
    }

    pub fn add_bool_with_tags(&self, value: bool, tags: &[(String, String)]) {
        self.base.add_bool(value);
        if tags.is_empty() {
            return;
        }
        self.registry
            .series(self.base.kind, &self.base.name, tags)
            .add_bool(value);
    }
}

use dashmap::DashMap;
use std::sync::Arc;

use crate::series::{MetricHandle, MetricKind, MetricSeriesSummary, Series};
use crate::tags::TagSet;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SeriesKey {
    kind: MetricKind,
    name: Arc<str>,
    tags: TagSet,
}

/// Thread-safe store of metric series, keyed by (kind, name, normalized
/// tags). Created at run start, snapshotted at run end; there is no hidden
/// process-wide instance.
#[derive(Debug, Default)]
pub struct Registry {
    series: DashMap<SeriesKey, Arc<Series>, ahash::RandomState>,
}

impl Registry {
    /// Returns a write handle bound to the untagged base series of `name`.
    pub fn handle(self: &Arc<Self>, kind: MetricKind, name: &str) -> MetricHandle {
        let base = self.series(kind, name, &[]);
        MetricHandle::new(self.clone(), base)
    }

    pub fn series(
        self: &Arc<Self>,
        kind: MetricKind,
        name: &str,
        tags: &[(String, String)],
    ) -> Arc<Series> {
        let name: Arc<str> = Arc::from(name);
        let tags = TagSet::normalize(tags);
        let key = SeriesKey {
            kind,
            name: name.clone(),
            tags: tags.clone(),
        };

        if let Some(existing) = self.series.get(&key) {
            return existing.clone();
        }

        self.series
            .entry(key)
            .or_insert_with(|| Arc::new(Series::new(kind, name, tags)))
            .clone()
    }

    /// Immutable view of every series. Safe to call while writers are still
    /// running; each series is summarized under its own bounded lock.
    pub fn snapshot(&self) -> Vec<MetricSeriesSummary> {
        let mut out = Vec::with_capacity(self.series.len());
        for entry in self.series.iter() {
            out.push(entry.value().summarize());
        }
        out.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.tags.cmp(&b.tags)));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::MetricValues;

    #[test]
    fn series_tag_order_is_normalized() {
        let registry = Arc::new(Registry::default());

        let a = registry.series(
            MetricKind::Counter,
            "m",
            &[
                ("b".to_string(), "2".to_string()),
                ("a".to_string(), "1".to_string()),
            ],
        );
        let b = registry.series(
            MetricKind::Counter,
            "m",
            &[
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "2".to_string()),
            ],
        );

        // Same logical tagset should point at the same underlying series.
        assert!(Arc::ptr_eq(&a, &b));

        a.add(1.0);
        let snapshot = registry.snapshot();
        let s = snapshot
            .iter()
            .find(|s| s.name == "m")
            .unwrap_or_else(|| panic!("missing metric summary"));
        assert_eq!(
            s.tags,
            vec![
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "2".to_string())
            ]
        );
    }

    #[test]
    fn same_name_different_kind_is_a_distinct_series() {
        let registry = Arc::new(Registry::default());
        let c = registry.series(MetricKind::Counter, "m", &[]);
        let t = registry.series(MetricKind::Trend, "m", &[]);
        assert!(!Arc::ptr_eq(&c, &t));
    }

    #[test]
    fn snapshot_is_sorted_by_name_then_tags() {
        let registry = Arc::new(Registry::default());
        registry.series(MetricKind::Counter, "b", &[]).add(1.0);
        registry.series(MetricKind::Counter, "a", &[]).add(1.0);
        registry
            .series(
                MetricKind::Counter,
                "a",
                &[("t".to_string(), "x".to_string())],
            )
            .add(1.0);

        let names: Vec<_> = registry
            .snapshot()
            .iter()
            .map(|s| (s.name.clone(), s.tags.len()))
            .collect();
        assert_eq!(
            names,
            vec![
                ("a".to_string(), 0),
                ("a".to_string(), 1),
                ("b".to_string(), 0)
            ]
        );
    }

    #[test]
    fn concurrent_counter_writes_lose_no_samples() {
        const WRITERS: usize = 100;
        const SAMPLES: usize = 10_000;

        let registry = Arc::new(Registry::default());
        let counter = registry.series(MetricKind::Counter, "hits", &[]);
        let rate = registry.series(MetricKind::Rate, "flips", &[]);

        let mut handles = Vec::with_capacity(WRITERS);
        for w in 0..WRITERS {
            let counter = counter.clone();
            let rate = rate.clone();
            handles.push(std::thread::spawn(move || {
                for i in 0..SAMPLES {
                    counter.add(1.0);
                    rate.add_bool((w + i) % 2 == 0);
                }
            }));
        }
        for h in handles {
            h.join().unwrap_or_else(|_| panic!("writer panicked"));
        }

        let expected = (WRITERS * SAMPLES) as f64;
        assert_eq!(counter.counter_value(), expected);

        let (total, _) = rate.rate_totals();
        assert_eq!(total, (WRITERS * SAMPLES) as u64);
    }

    #[test]
    fn concurrent_trend_writes_lose_no_samples() {
        const WRITERS: usize = 16;
        const SAMPLES: usize = 5_000;

        let registry = Arc::new(Registry::default());
        let trend = registry.series(MetricKind::Trend, "latency", &[]);

        let mut handles = Vec::with_capacity(WRITERS);
        for _ in 0..WRITERS {
            let trend = trend.clone();
            handles.push(std::thread::spawn(move || {
                for i in 0..SAMPLES {
                    trend.add((i % 100 + 1) as f64);
                }
            }));
        }
        for h in handles {
            h.join().unwrap_or_else(|_| panic!("writer panicked"));
        }

        let snapshot = registry.snapshot();
        let s = snapshot
            .iter()
            .find(|s| s.name == "latency")
            .unwrap_or_else(|| panic!("missing trend summary"));
        let MetricValues::Trend { count, .. } = s.values else {
            panic!("expected trend values");
        };
        assert_eq!(count, (WRITERS * SAMPLES) as u64);
    }
}

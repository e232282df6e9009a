use std::time::Duration;

use surge_metrics::{MetricSeriesSummary, MetricValues};

use crate::thresholds::ThresholdOutcome;

#[derive(Debug, Clone, Copy, Default)]
pub struct RunTotals {
    pub iterations: u64,
    pub checks_total: u64,
    pub checks_failed: u64,
}

/// Final snapshot of a run: the sole input to summary rendering.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub metrics: Vec<MetricSeriesSummary>,
    pub thresholds: Vec<ThresholdOutcome>,
    pub totals: RunTotals,
    pub run_duration: Duration,
    /// A teardown failure is reported here; it does not invalidate the
    /// metrics collected by the run itself.
    pub teardown_error: Option<String>,
}

impl RunReport {
    pub(crate) fn new(
        metrics: Vec<MetricSeriesSummary>,
        thresholds: Vec<ThresholdOutcome>,
        run_duration: Duration,
        teardown_error: Option<String>,
    ) -> Self {
        let totals = totals_from_snapshot(&metrics);
        Self {
            metrics,
            thresholds,
            totals,
            run_duration,
            teardown_error,
        }
    }

    pub fn checks_passed(&self) -> bool {
        self.totals.checks_failed == 0
    }

    pub fn thresholds_passed(&self) -> bool {
        self.thresholds.iter().all(|t| t.passed)
    }
}

fn totals_from_snapshot(metrics: &[MetricSeriesSummary]) -> RunTotals {
    let mut totals = RunTotals::default();

    for series in metrics.iter().filter(|s| s.tags.is_empty()) {
        match (series.name.as_str(), &series.values) {
            ("iterations", MetricValues::Counter { value }) => {
                totals.iterations = *value as u64;
            }
            ("checks", MetricValues::Rate { total, trues, .. }) => {
                totals.checks_total = *total;
                totals.checks_failed = total.saturating_sub(*trues);
            }
            _ => {}
        }
    }

    totals
}

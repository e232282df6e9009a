use std::sync::Arc;

use surge_metrics::{MetricHandle, MetricKind, Registry};

/// Records named boolean assertions into the `checks` rate metric.
///
/// Checks are an ordered list of (name, predicate) pairs evaluated against a
/// single subject; every result is recorded independently (no short
/// circuiting), tagged with the scenario tags plus the check name.
#[derive(Debug, Clone)]
pub struct CheckRecorder {
    checks: MetricHandle,
    tags: Arc<Vec<(String, String)>>,
}

impl CheckRecorder {
    pub(crate) fn new(registry: &Arc<Registry>, tags: Arc<Vec<(String, String)>>) -> Self {
        Self {
            checks: registry.handle(MetricKind::Rate, "checks"),
            tags,
        }
    }

    /// Records one check result; returns `passed` for chaining.
    pub fn record(&self, name: &str, passed: bool) -> bool {
        let mut tags = Vec::with_capacity(self.tags.len() + 1);
        tags.extend_from_slice(&self.tags);
        tags.push(("check".to_string(), name.to_string()));
        self.checks.add_bool_with_tags(passed, &tags);
        passed
    }

    /// Evaluates every predicate against `subject`, recording each result.
    /// Returns whether all of them passed.
    pub fn all<T>(&self, subject: &T, checks: &[(&str, &dyn Fn(&T) -> bool)]) -> bool {
        let mut all_passed = true;
        for (name, pred) in checks {
            all_passed &= self.record(name, pred(subject));
        }
        all_passed
    }
}

use std::sync::Arc;
use std::time::Duration;

use surge_metrics::{MetricHandle, MetricKind, Registry};

use crate::http::{HttpResponse, Result as HttpResult};

/// One finished (or failed) HTTP request, as seen by the metrics layer.
#[derive(Debug, Clone, Copy)]
pub struct RequestOutcome<'a> {
    pub method: &'a str,
    /// Logical name for the request, usually the path.
    pub name: &'a str,
    /// `None` means the request failed before a status was received.
    pub status: Option<u16>,
    pub failed: bool,
    pub elapsed: Duration,
    pub bytes_received: u64,
    pub bytes_sent: u64,
}

/// Handles for the built-in HTTP metrics. Owned by the iteration function's
/// closure, not by the engine; the engine only sees the registry.
#[derive(Debug, Clone)]
pub struct HttpMetrics {
    reqs: MetricHandle,
    duration: MetricHandle,
    failed: MetricHandle,
    data_received: MetricHandle,
    data_sent: MetricHandle,
}

impl HttpMetrics {
    pub fn new(registry: &Arc<Registry>) -> Self {
        Self {
            reqs: registry.handle(MetricKind::Counter, "http_reqs"),
            duration: registry.handle(MetricKind::Trend, "http_req_duration"),
            failed: registry.handle(MetricKind::Rate, "http_req_failed"),
            data_received: registry.handle(MetricKind::Counter, "data_received"),
            data_sent: registry.handle(MetricKind::Counter, "data_sent"),
        }
    }

    pub fn record(&self, outcome: RequestOutcome<'_>, tags: &[(String, String)]) {
        let mut merged_tags: Vec<(String, String)> = Vec::with_capacity(tags.len() + 3);
        merged_tags.extend_from_slice(tags);
        merged_tags.push(("method".to_string(), outcome.method.to_string()));
        merged_tags.push(("name".to_string(), outcome.name.to_string()));
        if let Some(status) = outcome.status {
            merged_tags.push(("status".to_string(), status.to_string()));
        }

        self.reqs.add_with_tags(1.0, &merged_tags);
        self.failed.add_bool_with_tags(outcome.failed, &merged_tags);

        // Transport errors have no meaningful duration; the trend ignores the
        // zero elapsed they report.
        self.duration
            .add_with_tags(outcome.elapsed.as_secs_f64() * 1000.0, &merged_tags);

        if outcome.bytes_received != 0 {
            self.data_received.add(outcome.bytes_received as f64);
        }
        if outcome.bytes_sent != 0 {
            self.data_sent.add(outcome.bytes_sent as f64);
        }
    }

    /// Records the outcome of one client call; a failed status (>= 400) and a
    /// transport error both count towards `http_req_failed`.
    pub fn record_result(
        &self,
        method: &str,
        name: &str,
        result: &HttpResult<HttpResponse>,
        tags: &[(String, String)],
    ) {
        match result {
            Ok(res) => self.record(
                RequestOutcome {
                    method,
                    name,
                    status: Some(res.status),
                    failed: res.status >= 400,
                    elapsed: res.elapsed,
                    bytes_received: res.bytes_received,
                    bytes_sent: res.bytes_sent,
                },
                tags,
            ),
            Err(_) => self.record(
                RequestOutcome {
                    method,
                    name,
                    status: None,
                    failed: true,
                    elapsed: Duration::ZERO,
                    bytes_received: 0,
                    bytes_sent: 0,
                },
                tags,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use surge_metrics::MetricValues;

    fn outcome(status: u16, elapsed_ms: u64) -> RequestOutcome<'static> {
        RequestOutcome {
            method: "GET",
            name: "/",
            status: Some(status),
            failed: status >= 400,
            elapsed: Duration::from_millis(elapsed_ms),
            bytes_received: 128,
            bytes_sent: 64,
        }
    }

    #[test]
    fn record_counts_requests_and_failures() {
        let registry = Arc::new(Registry::default());
        let metrics = HttpMetrics::new(&registry);

        metrics.record(outcome(200, 10), &[]);
        metrics.record(outcome(200, 20), &[]);
        metrics.record(outcome(500, 30), &[]);

        let snapshot = registry.snapshot();

        let reqs = snapshot
            .iter()
            .find(|s| s.name == "http_reqs" && s.tags.is_empty())
            .unwrap_or_else(|| panic!("missing http_reqs"));
        let MetricValues::Counter { value } = reqs.values else {
            panic!("expected counter values");
        };
        assert_eq!(value, 3.0);

        let failed = snapshot
            .iter()
            .find(|s| s.name == "http_req_failed" && s.tags.is_empty())
            .unwrap_or_else(|| panic!("missing http_req_failed"));
        let MetricValues::Rate { total, trues, .. } = failed.values else {
            panic!("expected rate values");
        };
        assert_eq!(total, 3);
        assert_eq!(trues, 1);
    }

    #[test]
    fn transport_errors_skip_the_duration_trend() {
        let registry = Arc::new(Registry::default());
        let metrics = HttpMetrics::new(&registry);

        let err: HttpResult<HttpResponse> =
            Err(crate::http::Error::InvalidUrl("nope".to_string()));
        metrics.record_result("GET", "/", &err, &[]);

        let snapshot = registry.snapshot();
        let duration = snapshot
            .iter()
            .find(|s| s.name == "http_req_duration" && s.tags.is_empty())
            .unwrap_or_else(|| panic!("missing http_req_duration"));
        let MetricValues::Trend { count, .. } = duration.values else {
            panic!("expected trend values");
        };
        assert_eq!(count, 0);

        let failed = snapshot
            .iter()
            .find(|s| s.name == "http_req_failed" && s.tags.is_empty())
            .unwrap_or_else(|| panic!("missing http_req_failed"));
        let MetricValues::Rate { total, trues, .. } = failed.values else {
            panic!("expected rate values");
        };
        assert_eq!(total, 1);
        assert_eq!(trues, 1);
    }
}

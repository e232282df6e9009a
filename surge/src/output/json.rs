use serde_json::{Map, Value, json};

use surge_core::{MetricSeriesSummary, MetricValues, RunReport};

/// Machine-readable form of the run report.
pub fn render(report: &RunReport) -> Value {
    json!({
        "run_duration_ms": report.run_duration.as_millis() as u64,
        "iterations": report.totals.iterations,
        "checks": {
            "total": report.totals.checks_total,
            "failed": report.totals.checks_failed,
        },
        "teardown_error": &report.teardown_error,
        "metrics": report.metrics.iter().map(metric_json).collect::<Vec<_>>(),
        "thresholds": report
            .thresholds
            .iter()
            .map(|t| json!({
                "metric": &t.metric,
                "expression": &t.expression,
                "observed": t.observed,
                "passed": t.passed,
            }))
            .collect::<Vec<_>>(),
        "passed": report.checks_passed() && report.thresholds_passed(),
    })
}

fn metric_json(series: &MetricSeriesSummary) -> Value {
    let mut tags = Map::new();
    for (k, v) in &series.tags {
        tags.insert(k.clone(), Value::String(v.clone()));
    }

    let values = match &series.values {
        MetricValues::Counter { value } => json!({ "value": value }),
        MetricValues::Gauge { value } => json!({ "value": value }),
        MetricValues::Rate { total, trues, rate } => json!({
            "total": total,
            "trues": trues,
            "rate": rate,
        }),
        MetricValues::Trend {
            count,
            min,
            max,
            avg,
            p50,
            p90,
            p95,
            p99,
        } => json!({
            "count": count,
            "min": min,
            "max": max,
            "avg": avg,
            "p50": p50,
            "p90": p90,
            "p95": p95,
            "p99": p99,
        }),
    };

    json!({
        "name": &series.name,
        "kind": series.kind.to_string(),
        "tags": Value::Object(tags),
        "values": values,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use surge_core::{MetricKind, RunTotals, ThresholdOutcome};

    #[test]
    fn render_produces_the_expected_document_shape() {
        let report = RunReport {
            metrics: vec![MetricSeriesSummary {
                name: "http_req_failed".to_string(),
                kind: MetricKind::Rate,
                tags: vec![("scenario".to_string(), "steady".to_string())],
                values: MetricValues::Rate {
                    total: 100,
                    trues: 1,
                    rate: Some(0.01),
                },
            }],
            thresholds: vec![ThresholdOutcome {
                metric: "http_req_failed".to_string(),
                expression: "rate<0.01".to_string(),
                observed: Some(0.01),
                passed: false,
            }],
            totals: RunTotals {
                iterations: 20,
                checks_total: 40,
                checks_failed: 0,
            },
            run_duration: Duration::from_millis(1500),
            teardown_error: None,
        };

        let doc = render(&report);
        assert_eq!(doc["run_duration_ms"], 1500);
        assert_eq!(doc["iterations"], 20);
        assert_eq!(doc["checks"]["failed"], 0);
        assert_eq!(doc["passed"], false);

        assert_eq!(doc["metrics"][0]["name"], "http_req_failed");
        assert_eq!(doc["metrics"][0]["kind"], "rate");
        assert_eq!(doc["metrics"][0]["tags"]["scenario"], "steady");
        assert_eq!(doc["metrics"][0]["values"]["rate"], 0.01);

        assert_eq!(doc["thresholds"][0]["passed"], false);
        assert_eq!(doc["thresholds"][0]["observed"], 0.01);
    }
}

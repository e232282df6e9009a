use std::collections::BTreeMap;
use std::fmt::Write as _;

use surge_core::{MetricSeriesSummary, MetricValues, RunReport};

/// Renders the end-of-run summary: totals, per-check pass/fail, the metric
/// table (min/avg/max/p95/p99 for trends) and threshold outcomes.
pub fn render(report: &RunReport) -> String {
    let mut out = String::new();

    out.push_str("summary\n");
    writeln!(&mut out, "  duration: {:.1}s", report.run_duration.as_secs_f64()).ok();
    writeln!(&mut out, "  iterations: {}", report.totals.iterations).ok();
    writeln!(
        &mut out,
        "  checks: pass={} fail={}",
        report.totals.checks_total - report.totals.checks_failed,
        report.totals.checks_failed
    )
    .ok();
    if let Some(err) = &report.teardown_error {
        writeln!(&mut out, "  teardown_error: {err}").ok();
    }

    render_checks(&report.metrics, &mut out);
    render_vus(&report.metrics, &mut out);
    render_metrics(&report.metrics, &mut out);
    render_thresholds(report, &mut out);

    out
}

fn render_checks(series: &[MetricSeriesSummary], out: &mut String) {
    // (scenario, check name) -> (pass, fail)
    let mut rows: BTreeMap<(String, String), (u64, u64)> = BTreeMap::new();

    for s in series.iter().filter(|s| s.name == "checks") {
        let MetricValues::Rate { total, trues, .. } = &s.values else {
            continue;
        };

        let mut scenario = None;
        let mut check = None;
        for (k, v) in &s.tags {
            match k.as_str() {
                "scenario" => scenario = Some(v.clone()),
                "check" => check = Some(v.clone()),
                _ => {}
            }
        }
        let (Some(scenario), Some(check)) = (scenario, check) else {
            continue;
        };

        let entry = rows.entry((scenario, check)).or_default();
        entry.0 = entry.0.saturating_add(*trues);
        entry.1 = entry.1.saturating_add(total.saturating_sub(*trues));
    }

    if rows.is_empty() {
        return;
    }

    out.push_str("\nchecks\n");
    let mut current_scenario: Option<&str> = None;
    for ((scenario, check), (pass, fail)) in &rows {
        if current_scenario != Some(scenario.as_str()) {
            writeln!(out, "scenario: {scenario}").ok();
            current_scenario = Some(scenario.as_str());
        }
        let status = if *fail > 0 { "FAIL" } else { "OK" };
        writeln!(out, "    {check}: pass={pass} fail={fail} [{status}]").ok();
    }
}

fn render_vus(series: &[MetricSeriesSummary], out: &mut String) {
    // `vu_active` correctly ends at 0, which looks odd on its own in a final
    // summary; render it together with the tracked peak per scenario.
    let mut end: BTreeMap<String, i64> = BTreeMap::new();
    let mut peak: BTreeMap<String, i64> = BTreeMap::new();

    for s in series {
        let MetricValues::Gauge { value } = &s.values else {
            continue;
        };
        let Some(scenario) = s
            .tags
            .iter()
            .find(|(k, _)| k == "scenario")
            .map(|(_, v)| v.clone())
        else {
            continue;
        };

        match s.name.as_str() {
            "vu_active" => {
                end.insert(scenario, *value);
            }
            "vu_active_max" => {
                peak.insert(scenario, *value);
            }
            _ => {}
        }
    }

    if end.is_empty() {
        return;
    }

    out.push_str("\nvus\n");
    for (scenario, end_value) in &end {
        let peak_value = peak.get(scenario).copied().unwrap_or(0);
        writeln!(out, "    {scenario} = end={end_value} peak={peak_value}").ok();
    }
}

fn render_metrics(series: &[MetricSeriesSummary], out: &mut String) {
    let rows: Vec<&MetricSeriesSummary> = series
        .iter()
        .filter(|s| {
            s.tags.is_empty() && s.name != "checks" && !s.name.starts_with("vu_active")
        })
        .collect();

    if rows.is_empty() {
        return;
    }

    out.push_str("\nmetrics\n");
    for s in rows {
        match &s.values {
            MetricValues::Counter { value } => {
                writeln!(out, "    {} = {value}", s.name).ok();
            }
            MetricValues::Gauge { value } => {
                writeln!(out, "    {} = {value}", s.name).ok();
            }
            MetricValues::Rate { total, trues, rate } => match rate {
                Some(rate) => {
                    writeln!(
                        out,
                        "    {} = trues={trues} total={total} rate={rate:.3}",
                        s.name
                    )
                    .ok();
                }
                None => {
                    writeln!(out, "    {} = trues={trues} total={total}", s.name).ok();
                }
            },
            MetricValues::Trend {
                count,
                min,
                max,
                avg,
                p95,
                p99,
                ..
            } => {
                writeln!(
                    out,
                    "    {} = min={} avg={} max={} p95={} p99={} (n={count})",
                    s.name,
                    format_ms(*min),
                    format_ms(*avg),
                    format_ms(*max),
                    format_ms(*p95),
                    format_ms(*p99),
                )
                .ok();
            }
        }
    }
}

fn render_thresholds(report: &RunReport, out: &mut String) {
    if report.thresholds.is_empty() {
        return;
    }

    out.push_str("\nthresholds\n");
    for t in &report.thresholds {
        let status = if t.passed { "PASS" } else { "FAIL" };
        match t.observed {
            Some(observed) => {
                writeln!(
                    out,
                    "    {}: {} observed={observed:.3} [{status}]",
                    t.metric, t.expression
                )
                .ok();
            }
            None => {
                writeln!(
                    out,
                    "    {}: {} observed=- [{status}]",
                    t.metric, t.expression
                )
                .ok();
            }
        }
    }
}

fn format_ms(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{v:.2}ms"),
        None => "-".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use surge_core::{MetricKind, RunTotals, ThresholdOutcome};

    fn report() -> RunReport {
        let metrics = vec![
            MetricSeriesSummary {
                name: "iterations".to_string(),
                kind: MetricKind::Counter,
                tags: Vec::new(),
                values: MetricValues::Counter { value: 12.0 },
            },
            MetricSeriesSummary {
                name: "checks".to_string(),
                kind: MetricKind::Rate,
                tags: Vec::new(),
                values: MetricValues::Rate {
                    total: 24,
                    trues: 23,
                    rate: Some(23.0 / 24.0),
                },
            },
            MetricSeriesSummary {
                name: "checks".to_string(),
                kind: MetricKind::Rate,
                tags: vec![
                    ("check".to_string(), "status is 200".to_string()),
                    ("scenario".to_string(), "steady".to_string()),
                ],
                values: MetricValues::Rate {
                    total: 12,
                    trues: 11,
                    rate: Some(11.0 / 12.0),
                },
            },
            MetricSeriesSummary {
                name: "http_req_duration".to_string(),
                kind: MetricKind::Trend,
                tags: Vec::new(),
                values: MetricValues::Trend {
                    count: 12,
                    min: Some(1.5),
                    max: Some(20.0),
                    avg: Some(5.25),
                    p50: Some(4.0),
                    p90: Some(15.0),
                    p95: Some(18.0),
                    p99: Some(19.5),
                },
            },
            MetricSeriesSummary {
                name: "vu_active".to_string(),
                kind: MetricKind::Gauge,
                tags: vec![("scenario".to_string(), "steady".to_string())],
                values: MetricValues::Gauge { value: 0 },
            },
            MetricSeriesSummary {
                name: "vu_active_max".to_string(),
                kind: MetricKind::Gauge,
                tags: vec![("scenario".to_string(), "steady".to_string())],
                values: MetricValues::Gauge { value: 4 },
            },
        ];
        let thresholds = vec![
            ThresholdOutcome {
                metric: "http_req_duration".to_string(),
                expression: "p(95)<500".to_string(),
                observed: Some(18.0),
                passed: true,
            },
            ThresholdOutcome {
                metric: "missing".to_string(),
                expression: "avg<1".to_string(),
                observed: None,
                passed: false,
            },
        ];

        RunReport {
            metrics,
            thresholds,
            totals: RunTotals {
                iterations: 12,
                checks_total: 24,
                checks_failed: 1,
            },
            run_duration: Duration::from_secs(10),
            teardown_error: None,
        }
    }

    #[test]
    fn render_includes_every_section() {
        let text = render(&report());

        assert!(text.contains("summary"));
        assert!(text.contains("iterations: 12"));
        assert!(text.contains("checks: pass=23 fail=1"));

        assert!(text.contains("scenario: steady"));
        assert!(text.contains("status is 200: pass=11 fail=1 [FAIL]"));

        assert!(text.contains("steady = end=0 peak=4"));

        assert!(text.contains(
            "http_req_duration = min=1.50ms avg=5.25ms max=20.00ms p95=18.00ms p99=19.50ms (n=12)"
        ));

        assert!(text.contains("http_req_duration: p(95)<500 observed=18.000 [PASS]"));
        assert!(text.contains("missing: avg<1 observed=- [FAIL]"));
    }

    #[test]
    fn teardown_errors_are_surfaced() {
        let mut r = report();
        r.teardown_error = Some("cleanup failed".to_string());
        let text = render(&r);
        assert!(text.contains("teardown_error: cleanup failed"));
    }
}

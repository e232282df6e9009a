use surge_metrics::{MetricSeriesSummary, MetricValues};

use crate::config::ThresholdSpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdOp {
    Lt,
    Lte,
    Gt,
    Gte,
    Eq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdAgg {
    Avg,
    Min,
    Max,
    Count,
    Rate,
    P(u32),
}

#[derive(Debug, Clone)]
pub struct ThresholdExpr {
    pub agg: ThresholdAgg,
    pub op: ThresholdOp,
    pub value: f64,
}

/// Result of evaluating a single threshold expression against the final
/// snapshot. A metric missing from the snapshot yields `passed: false` with
/// `observed: None`.
#[derive(Debug, Clone)]
pub struct ThresholdOutcome {
    pub metric: String,
    pub expression: String,
    pub observed: Option<f64>,
    pub passed: bool,
}

/// Percentiles the snapshot retains; anything else in `p(N)` is a config
/// error, caught at plan validation.
const SUPPORTED_PERCENTILES: [u32; 4] = [50, 90, 95, 99];

pub fn parse_threshold_expr(raw: &str) -> Result<ThresholdExpr, String> {
    let s: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if s.is_empty() {
        return Err("empty threshold".to_string());
    }

    // Find operator
    let ops = [
        ("<=", ThresholdOp::Lte),
        (">=", ThresholdOp::Gte),
        ("==", ThresholdOp::Eq),
        ("<", ThresholdOp::Lt),
        (">", ThresholdOp::Gt),
    ];
    let (op_pos, op_len, op) = ops
        .iter()
        .find_map(|(tok, op)| s.find(tok).map(|pos| (pos, tok.len(), *op)))
        .ok_or_else(|| format!("invalid threshold (missing operator): {raw}"))?;

    let (left, right_with_op) = s.split_at(op_pos);
    let right = &right_with_op[op_len..];
    if left.is_empty() || right.is_empty() {
        return Err(format!("invalid threshold: {raw}"));
    }

    let agg = if left.eq_ignore_ascii_case("avg") {
        ThresholdAgg::Avg
    } else if left.eq_ignore_ascii_case("min") {
        ThresholdAgg::Min
    } else if left.eq_ignore_ascii_case("max") {
        ThresholdAgg::Max
    } else if left.eq_ignore_ascii_case("count") {
        ThresholdAgg::Count
    } else if left.eq_ignore_ascii_case("rate") {
        ThresholdAgg::Rate
    } else if let Some(inner) = left.strip_prefix("p(").and_then(|v| v.strip_suffix(')')) {
        let p: u32 = inner
            .parse()
            .map_err(|_| format!("invalid percentile in threshold: {raw}"))?;
        if !SUPPORTED_PERCENTILES.contains(&p) {
            return Err(format!(
                "unsupported percentile in threshold (expected one of 50/90/95/99): {raw}"
            ));
        }
        ThresholdAgg::P(p)
    } else {
        return Err(format!("unknown aggregation `{left}` in threshold: {raw}"));
    };

    let value: f64 = right
        .parse()
        .map_err(|_| format!("invalid numeric value in threshold: {raw}"))?;

    Ok(ThresholdExpr { agg, op, value })
}

/// Pure evaluation over a frozen snapshot; one outcome per expression.
pub fn evaluate_thresholds(
    thresholds: &[ThresholdSpec],
    metrics: &[MetricSeriesSummary],
) -> Vec<ThresholdOutcome> {
    let mut out = Vec::new();

    for set in thresholds {
        let metric_name = set.metric.as_str();
        // Thresholds apply to the untagged base series only.
        let series = metrics
            .iter()
            .find(|m| m.name == metric_name && m.tags.is_empty());

        for expr_raw in &set.expressions {
            // Unparsable expressions are caught at validation; if one slips
            // through, report it as unmet rather than crash.
            let (observed, passed) = match parse_threshold_expr(expr_raw) {
                Ok(expr) => {
                    let observed = series.and_then(|s| observed_value(s, expr.agg));
                    let passed = observed
                        .map(|v| compare(v, expr.op, expr.value))
                        .unwrap_or(false);
                    (observed, passed)
                }
                Err(_) => (None, false),
            };

            out.push(ThresholdOutcome {
                metric: metric_name.to_string(),
                expression: expr_raw.clone(),
                observed,
                passed,
            });
        }
    }

    out
}

fn compare(left: f64, op: ThresholdOp, right: f64) -> bool {
    match op {
        ThresholdOp::Lt => left < right,
        ThresholdOp::Lte => left <= right,
        ThresholdOp::Gt => left > right,
        ThresholdOp::Gte => left >= right,
        ThresholdOp::Eq => left == right,
    }
}

fn observed_value(series: &MetricSeriesSummary, agg: ThresholdAgg) -> Option<f64> {
    match (&series.values, agg) {
        (MetricValues::Trend { avg, .. }, ThresholdAgg::Avg) => *avg,
        (MetricValues::Trend { min, .. }, ThresholdAgg::Min) => *min,
        (MetricValues::Trend { max, .. }, ThresholdAgg::Max) => *max,
        (MetricValues::Trend { count, .. }, ThresholdAgg::Count) => Some(*count as f64),
        (
            MetricValues::Trend {
                p50, p90, p95, p99, ..
            },
            ThresholdAgg::P(p),
        ) => match p {
            50 => *p50,
            90 => *p90,
            95 => *p95,
            99 => *p99,
            _ => None,
        },

        (MetricValues::Counter { value }, ThresholdAgg::Count) => Some(*value),
        (MetricValues::Gauge { value }, ThresholdAgg::Avg) => Some(*value as f64),
        (MetricValues::Gauge { value }, ThresholdAgg::Min) => Some(*value as f64),
        (MetricValues::Gauge { value }, ThresholdAgg::Max) => Some(*value as f64),

        (MetricValues::Rate { rate, .. }, ThresholdAgg::Rate) => *rate,
        (MetricValues::Rate { total, .. }, ThresholdAgg::Count) => Some(*total as f64),

        // Non-sensical combinations.
        (_, _) => None,
    }
}

mod check;
mod config;
mod error;
mod gate;
mod http;
mod progress;
mod report;
mod request_metrics;
mod run;
mod schedule;
mod shared;
mod thresholds;
mod vu;

pub use check::CheckRecorder;
pub use config::{Executor, ExecutorKind, RunPlan, ScenarioSpec, Stage, ThresholdSpec};
pub use error::{Error, Result};
pub use gate::IterationGate;
pub use http::{
    Error as HttpError, HttpClient, HttpRequest, HttpResponse, Result as HttpResult,
};
pub use progress::{ProgressFn, ProgressUpdate, ScenarioProgress, StageProgress};
pub use report::{RunReport, RunTotals};
pub use request_metrics::{HttpMetrics, RequestOutcome};
pub use run::{Hooks, SetupFn, SetupFuture, TeardownFn, TeardownFuture, run_plan};
pub use schedule::{RampSchedule, StageSnapshot};
pub use shared::{SharedData, SharedValue};
pub use thresholds::{
    ThresholdAgg, ThresholdExpr, ThresholdOp, ThresholdOutcome, evaluate_thresholds,
    parse_threshold_expr,
};
pub use vu::VuContext;

pub use surge_metrics::{
    MetricHandle, MetricKind, MetricSeriesSummary, MetricValues, Registry,
};

use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct StageProgress {
    /// 1-based stage index.
    pub stage: usize,
    pub stages: usize,
    pub stage_elapsed: Duration,
    pub stage_remaining: Duration,
    pub start_target: u64,
    pub end_target: u64,
    pub current_target: u64,
}

#[derive(Debug, Clone)]
pub enum ScenarioProgress {
    ConstantVus {
        vus: u64,
        duration: Duration,
    },
    RampingVus {
        total_duration: Duration,
        stage: Option<StageProgress>,
    },
}

/// One per-scenario progress emission, produced once per scheduler tick.
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    /// Monotonic tick counter (1-based) for progress emissions.
    pub tick: u64,
    pub elapsed: Duration,
    pub scenario: String,
    pub progress: ScenarioProgress,
    pub active_vus: i64,
    pub iterations_total: u64,
    /// Iterations/sec observed during the last progress interval.
    pub iterations_per_sec_now: f64,
}

pub type ProgressFn = Arc<dyn Fn(ProgressUpdate) + Send + Sync + 'static>;

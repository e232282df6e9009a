use std::fmt::Display;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use tokio::sync::Barrier;
use tokio::time::MissedTickBehavior;

use surge_metrics::Registry;

use crate::config::{Executor, RunPlan};
use crate::error::{Error, Result};
use crate::gate::IterationGate;
use crate::progress::{ProgressFn, ProgressUpdate, ScenarioProgress, StageProgress};
use crate::report::RunReport;
use crate::schedule::RampSchedule;
use crate::shared::SharedData;
use crate::thresholds::evaluate_thresholds;
use crate::vu::{ScenarioMetrics, StartSignal, VuContext, VuRunner, VuWork};

pub type SetupFuture =
    Pin<Box<dyn Future<Output = std::result::Result<SharedData, String>> + Send>>;
pub type SetupFn = Box<dyn FnOnce() -> SetupFuture + Send>;

pub type TeardownFuture = Pin<Box<dyn Future<Output = std::result::Result<(), String>> + Send>>;
pub type TeardownFn = Box<dyn FnOnce(Option<SharedData>) -> TeardownFuture + Send>;

/// Optional once-per-run lifecycle hooks. `setup`'s value is passed to every
/// iteration and to `teardown`.
#[derive(Default)]
pub struct Hooks {
    pub setup: Option<SetupFn>,
    pub teardown: Option<TeardownFn>,
}

enum ProgressKind {
    Constant { vus: u64, duration: Duration },
    Ramping { schedule: Arc<RampSchedule> },
}

struct ProgressScenario {
    name: String,
    kind: ProgressKind,
    metrics: ScenarioMetrics,
}

/// Runs every scenario of `plan` concurrently to completion against the
/// given registry, then evaluates thresholds over the final snapshot.
///
/// `iterate` is awaited once per iteration per VU; an `Err` from it is
/// recorded and the VU carries on. The registry is created by the caller and
/// read here only after all VUs have stopped (the progress ticker reads
/// bounded intermediate snapshots while the run is live).
pub async fn run_plan<F, Fut, E>(
    plan: RunPlan,
    registry: Arc<Registry>,
    iterate: F,
    hooks: Hooks,
    progress: Option<ProgressFn>,
) -> Result<RunReport>
where
    F: Fn(VuContext) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<(), E>> + Send + 'static,
    E: Display + Send + 'static,
{
    plan.validate()?;

    let shared: Option<SharedData> = match hooks.setup {
        Some(setup) => Some(setup().await.map_err(Error::Setup)?),
        None => None,
    };

    let total_vus = plan.total_vus().min(usize::MAX as u64) as usize;
    let ready_barrier = Arc::new(Barrier::new(total_vus.saturating_add(1)));
    let start_signal = Arc::new(StartSignal::new());
    let run_started: Arc<OnceLock<Instant>> = Arc::new(OnceLock::new());

    let mut gates: Vec<Arc<IterationGate>> = Vec::new();
    let mut progress_scenarios: Vec<ProgressScenario> = Vec::new();
    let mut handles = Vec::with_capacity(total_vus);
    let mut next_vu_id: u64 = 1;

    for scenario in &plan.scenarios {
        let scenario_name: Arc<str> = Arc::from(scenario.name.as_str());

        let mut tags = scenario.tags.clone();
        tags.push(("scenario".to_string(), scenario.name.clone()));
        let tags = Arc::new(tags);
        let metrics = ScenarioMetrics::new(&registry, tags.clone());

        let work = match &scenario.executor {
            Executor::ConstantVus { vus, duration } => {
                let gate = Arc::new(IterationGate::new(*duration));
                gates.push(gate.clone());

                if progress.is_some() {
                    progress_scenarios.push(ProgressScenario {
                        name: scenario.name.clone(),
                        kind: ProgressKind::Constant {
                            vus: *vus,
                            duration: *duration,
                        },
                        metrics: metrics.clone(),
                    });
                }

                VuWork::Constant { gate }
            }
            Executor::RampingVus { start_vus, stages } => {
                let schedule = Arc::new(RampSchedule::new(*start_vus, stages.clone()));

                if progress.is_some() {
                    progress_scenarios.push(ProgressScenario {
                        name: scenario.name.clone(),
                        kind: ProgressKind::Ramping {
                            schedule: schedule.clone(),
                        },
                        metrics: metrics.clone(),
                    });
                }

                VuWork::Ramping { schedule }
            }
        };

        let scenario_max_vus = scenario.executor.max_vus();
        for scenario_vu in 1..=scenario_max_vus {
            let vu_id = next_vu_id;
            next_vu_id = next_vu_id.saturating_add(1);

            let ctx = VuContext::new(
                vu_id,
                scenario_vu,
                scenario_name.clone(),
                registry.clone(),
                tags.clone(),
                shared.clone(),
            );
            let runner = VuRunner {
                ctx,
                work: work.clone(),
                metrics: metrics.clone(),
                ready_barrier: ready_barrier.clone(),
                start_signal: start_signal.clone(),
                run_started: run_started.clone(),
            };

            let iterate = iterate.clone();
            handles.push(tokio::spawn(runner.drive(iterate)));
        }
    }

    // Block until every VU is parked at the start line, then anchor the run
    // clock and open the gate. This keeps spawn skew out of the measured run.
    ready_barrier.wait().await;

    let started = Instant::now();
    let _ = run_started.set(started);
    for gate in &gates {
        gate.start_at(started);
    }
    start_signal.start();
    tracing::info!(
        scenarios = plan.scenarios.len(),
        vus = total_vus,
        "run started"
    );

    let progress_handle = progress.map(|progress| {
        let scenarios = progress_scenarios;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            interval.tick().await;

            let mut tick_id: u64 = 0;
            let mut last_at = Instant::now();
            let mut last_iterations: Vec<u64> = scenarios
                .iter()
                .map(|s| s.metrics.iterations_total())
                .collect();

            loop {
                interval.tick().await;
                tick_id = tick_id.saturating_add(1);

                let now = Instant::now();
                let dt = now.duration_since(last_at);
                last_at = now;
                let elapsed = started.elapsed();

                for (scenario, last) in scenarios.iter().zip(last_iterations.iter_mut()) {
                    let iterations_total = scenario.metrics.iterations_total();
                    let delta = iterations_total.saturating_sub(*last);
                    *last = iterations_total;
                    let iterations_per_sec_now =
                        (delta as f64) / dt.as_secs_f64().max(1e-9);

                    let progress_val = match &scenario.kind {
                        ProgressKind::Constant { vus, duration } => {
                            ScenarioProgress::ConstantVus {
                                vus: *vus,
                                duration: *duration,
                            }
                        }
                        ProgressKind::Ramping { schedule } => {
                            let stage =
                                schedule.stage_snapshot_at(elapsed).map(|st| StageProgress {
                                    stage: st.index + 1,
                                    stages: st.count,
                                    stage_elapsed: st.stage_elapsed,
                                    stage_remaining: st.stage_remaining,
                                    start_target: st.start_target,
                                    end_target: st.end_target,
                                    current_target: st.current_target,
                                });
                            ScenarioProgress::RampingVus {
                                total_duration: schedule.total_duration(),
                                stage,
                            }
                        }
                    };

                    (progress)(ProgressUpdate {
                        tick: tick_id,
                        elapsed,
                        scenario: scenario.name.clone(),
                        progress: progress_val,
                        active_vus: scenario.metrics.active_vus(),
                        iterations_total,
                        iterations_per_sec_now,
                    });
                }
            }
        })
    });

    for h in handles {
        h.await?;
    }

    if let Some(h) = progress_handle {
        h.abort();
        let _ = h.await;
    }

    let run_duration = started.elapsed();
    tracing::info!(?run_duration, "all scenarios complete");

    let teardown_error = match hooks.teardown {
        Some(teardown) => teardown(shared).await.err(),
        None => None,
    };
    if let Some(err) = &teardown_error {
        tracing::warn!(error = %err, "teardown failed");
    }

    let metrics = registry.snapshot();
    let thresholds = evaluate_thresholds(&plan.thresholds, &metrics);

    Ok(RunReport::new(
        metrics,
        thresholds,
        run_duration,
        teardown_error,
    ))
}

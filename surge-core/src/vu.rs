use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tokio::sync::{Barrier, Notify};

use surge_metrics::{MetricHandle, MetricKind, Registry, Series};

use crate::check::CheckRecorder;
use crate::gate::IterationGate;
use crate::schedule::RampSchedule;
use crate::shared::SharedData;

/// Opens once, for all VUs at the same instant, so iteration loops start
/// aligned with the run clock.
#[derive(Debug)]
pub(crate) struct StartSignal {
    started: AtomicBool,
    notify: Notify,
}

impl StartSignal {
    pub(crate) fn new() -> Self {
        Self {
            started: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    pub(crate) fn start(&self) {
        self.started.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub(crate) async fn wait(&self) {
        while !self.started.load(Ordering::Acquire) {
            self.notify.notified().await;
        }
    }
}

/// Context handed to the iteration function, once per iteration.
///
/// This is the engine's entire surface towards user code: metric handles,
/// check recording, and the shared setup value. What the iteration actually
/// does (HTTP or anything else) is the caller's business.
#[derive(Debug, Clone)]
pub struct VuContext {
    /// Run-unique VU id.
    pub vu_id: u64,
    /// 1-based index of this VU within its scenario.
    pub scenario_vu: u64,
    pub scenario: Arc<str>,
    registry: Arc<Registry>,
    tags: Arc<Vec<(String, String)>>,
    checks: CheckRecorder,
    shared: Option<SharedData>,
}

impl VuContext {
    pub(crate) fn new(
        vu_id: u64,
        scenario_vu: u64,
        scenario: Arc<str>,
        registry: Arc<Registry>,
        tags: Arc<Vec<(String, String)>>,
        shared: Option<SharedData>,
    ) -> Self {
        let checks = CheckRecorder::new(&registry, tags.clone());
        Self {
            vu_id,
            scenario_vu,
            scenario,
            registry,
            tags,
            checks,
            shared,
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Scenario tags (always includes `scenario`), for tagging custom samples.
    pub fn tags(&self) -> &[(String, String)] {
        &self.tags
    }

    /// Value returned by `setup()`, if a setup hook was configured.
    pub fn shared(&self) -> Option<&SharedData> {
        self.shared.as_ref()
    }

    /// Write handle for a custom metric.
    pub fn metric(&self, kind: MetricKind, name: &str) -> MetricHandle {
        self.registry.handle(kind, name)
    }

    /// Evaluates an ordered list of named predicates against `subject`,
    /// recording every result; returns whether all passed.
    pub fn check<T>(&self, subject: &T, checks: &[(&str, &dyn Fn(&T) -> bool)]) -> bool {
        self.checks.all(subject, checks)
    }

    pub fn record_check(&self, name: &str, passed: bool) -> bool {
        self.checks.record(name, passed)
    }
}

#[derive(Debug, Clone)]
pub(crate) enum VuWork {
    Constant { gate: Arc<IterationGate> },
    Ramping { schedule: Arc<RampSchedule> },
}

/// Per-scenario engine metric handles, shared by the scenario's VUs.
#[derive(Debug, Clone)]
pub(crate) struct ScenarioMetrics {
    tags: Arc<Vec<(String, String)>>,
    iterations: MetricHandle,
    iteration_duration: MetricHandle,
    iteration_failed: MetricHandle,
    vu_active: Arc<Series>,
    vu_active_max: Arc<Series>,
    /// Scenario-tagged `iterations` series, read by the progress ticker.
    iterations_series: Arc<Series>,
}

impl ScenarioMetrics {
    pub(crate) fn new(registry: &Arc<Registry>, tags: Arc<Vec<(String, String)>>) -> Self {
        Self {
            iterations: registry.handle(MetricKind::Counter, "iterations"),
            iteration_duration: registry.handle(MetricKind::Trend, "iteration_duration"),
            iteration_failed: registry.handle(MetricKind::Rate, "iteration_failed"),
            vu_active: registry.series(MetricKind::Gauge, "vu_active", &tags),
            vu_active_max: registry.series(MetricKind::Gauge, "vu_active_max", &tags),
            iterations_series: registry.series(MetricKind::Counter, "iterations", &tags),
            tags,
        }
    }

    fn record_iteration(&self, elapsed: Duration, ok: bool) {
        self.iterations.add_with_tags(1.0, &self.tags);
        self.iteration_duration
            .add_with_tags(elapsed.as_secs_f64() * 1000.0, &self.tags);
        self.iteration_failed.add_bool_with_tags(!ok, &self.tags);
    }

    pub(crate) fn active_vus(&self) -> i64 {
        self.vu_active.gauge_value()
    }

    pub(crate) fn iterations_total(&self) -> u64 {
        self.iterations_series.counter_value() as u64
    }
}

/// Marks a VU as live for its scenario while held; tracks the peak so the
/// end-of-run summary isn't a confusing `vu_active = 0`.
struct ActiveVuGuard {
    vu_active: Arc<Series>,
}

impl ActiveVuGuard {
    fn enter(metrics: &ScenarioMetrics) -> Self {
        let now_active = metrics.vu_active.increment_gauge(1);
        metrics.vu_active_max.raise_gauge(now_active);
        Self {
            vu_active: metrics.vu_active.clone(),
        }
    }
}

impl Drop for ActiveVuGuard {
    fn drop(&mut self) {
        self.vu_active.decrement_gauge(1);
    }
}

/// One virtual user: spawned at run start, parks until its executor wants it
/// live, then repeatedly awaits the iteration function. Stop conditions are
/// only observed between iterations; an in-flight iteration always finishes.
pub(crate) struct VuRunner {
    pub(crate) ctx: VuContext,
    pub(crate) work: VuWork,
    pub(crate) metrics: ScenarioMetrics,
    pub(crate) ready_barrier: Arc<Barrier>,
    pub(crate) start_signal: Arc<StartSignal>,
    pub(crate) run_started: Arc<OnceLock<Instant>>,
}

impl VuRunner {
    pub(crate) async fn drive<F, Fut, E>(self, iterate: F)
    where
        F: Fn(VuContext) -> Fut + Send + Sync,
        Fut: Future<Output = Result<(), E>> + Send,
        E: Display,
    {
        // Line up with every other VU, then block until the coordinator
        // anchors the run clock and opens the gate.
        self.ready_barrier.wait().await;
        self.start_signal.wait().await;

        let started = self
            .run_started
            .get()
            .copied()
            .unwrap_or_else(Instant::now);

        match &self.work {
            VuWork::Constant { gate } => {
                let _active = ActiveVuGuard::enter(&self.metrics);
                while gate.next() {
                    self.run_one(&iterate).await;
                }
            }
            VuWork::Ramping { schedule } => {
                let mut active: Option<ActiveVuGuard> = None;
                loop {
                    let elapsed = started.elapsed();
                    if schedule.is_done(elapsed) {
                        break;
                    }

                    let target = schedule.target_at(elapsed);
                    if self.ctx.scenario_vu > target {
                        // Not ramped in yet, or demoted: park until the
                        // schedule can reach this VU again.
                        active = None;
                        let wait = schedule.next_recheck_in(elapsed, self.ctx.scenario_vu);
                        tokio::time::sleep(wait.max(Duration::from_millis(1))).await;
                        continue;
                    }

                    if active.is_none() {
                        active = Some(ActiveVuGuard::enter(&self.metrics));
                    }
                    self.run_one(&iterate).await;
                }
            }
        }
    }

    async fn run_one<F, Fut, E>(&self, iterate: &F)
    where
        F: Fn(VuContext) -> Fut + Send + Sync,
        Fut: Future<Output = Result<(), E>> + Send,
        E: Display,
    {
        let started = Instant::now();
        let result = iterate(self.ctx.clone()).await;
        let elapsed = started.elapsed();

        self.metrics.record_iteration(elapsed, result.is_ok());

        if let Err(err) = result {
            // Fire and continue: a failed iteration never stops the VU.
            tracing::warn!(
                scenario = %self.ctx.scenario,
                vu = self.ctx.vu_id,
                error = %err,
                "iteration failed",
            );
        }
    }
}

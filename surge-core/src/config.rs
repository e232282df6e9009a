use std::collections::HashSet;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::thresholds;

/// One step of a ramping executor: interpolate towards `target` VUs over
/// `duration`. A zero duration jumps the target instantly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stage {
    pub duration: Duration,
    pub target: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
pub enum ExecutorKind {
    #[strum(serialize = "constant-vus")]
    ConstantVus,
    #[strum(serialize = "ramping-vus")]
    RampingVus,
}

/// VU-population strategy for one scenario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Executor {
    ConstantVus { vus: u64, duration: Duration },
    RampingVus { start_vus: u64, stages: Vec<Stage> },
}

impl Executor {
    pub fn kind(&self) -> ExecutorKind {
        match self {
            Executor::ConstantVus { .. } => ExecutorKind::ConstantVus,
            Executor::RampingVus { .. } => ExecutorKind::RampingVus,
        }
    }

    /// The most VUs this executor can ever have live at once.
    pub fn max_vus(&self) -> u64 {
        match self {
            Executor::ConstantVus { vus, .. } => *vus,
            Executor::RampingVus { start_vus, stages } => {
                let max_stage = stages.iter().map(|st| st.target).max().unwrap_or(0);
                max_stage.max(*start_vus)
            }
        }
    }

    pub fn total_duration(&self) -> Duration {
        match self {
            Executor::ConstantVus { duration, .. } => *duration,
            Executor::RampingVus { stages, .. } => stages
                .iter()
                .fold(Duration::ZERO, |acc, st| acc.saturating_add(st.duration)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScenarioSpec {
    /// Unique key; also attached as the `scenario` tag on every sample.
    pub name: String,
    pub executor: Executor,
    /// Extra tags attached to every sample the scenario produces.
    pub tags: Vec<(String, String)>,
}

/// Pass/fail rules over one metric, evaluated against the final snapshot.
#[derive(Debug, Clone)]
pub struct ThresholdSpec {
    pub metric: String,
    pub expressions: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RunPlan {
    pub scenarios: Vec<ScenarioSpec>,
    pub thresholds: Vec<ThresholdSpec>,
}

impl RunPlan {
    /// Fails fast on misconfiguration, before any VU is spawned.
    pub fn validate(&self) -> Result<()> {
        if self.scenarios.is_empty() {
            return Err(Error::NoScenarios);
        }

        let mut seen: HashSet<&str> = HashSet::with_capacity(self.scenarios.len());
        for scenario in &self.scenarios {
            if !seen.insert(scenario.name.as_str()) {
                return Err(Error::DuplicateScenario(scenario.name.clone()));
            }

            match &scenario.executor {
                Executor::ConstantVus { vus, .. } => {
                    if *vus == 0 {
                        return Err(Error::InvalidVus);
                    }
                }
                Executor::RampingVus { start_vus, stages } => {
                    let max_stage = stages.iter().map(|st| st.target).max().unwrap_or(0);
                    if max_stage.max(*start_vus) == 0 {
                        return Err(Error::InvalidVus);
                    }
                    if stages.is_empty() || scenario.executor.total_duration().is_zero() {
                        return Err(Error::InvalidStages);
                    }
                }
            }
        }

        for set in &self.thresholds {
            for raw in &set.expressions {
                thresholds::parse_threshold_expr(raw).map_err(|reason| {
                    Error::InvalidThreshold {
                        metric: set.metric.clone(),
                        reason,
                    }
                })?;
            }
        }

        Ok(())
    }

    pub fn total_vus(&self) -> u64 {
        self.scenarios
            .iter()
            .map(|s| s.executor.max_vus())
            .fold(0, u64::saturating_add)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constant(name: &str, vus: u64) -> ScenarioSpec {
        ScenarioSpec {
            name: name.to_string(),
            executor: Executor::ConstantVus {
                vus,
                duration: Duration::from_secs(1),
            },
            tags: Vec::new(),
        }
    }

    #[test]
    fn validate_rejects_empty_plan() {
        let plan = RunPlan::default();
        assert!(matches!(plan.validate(), Err(Error::NoScenarios)));
    }

    #[test]
    fn validate_rejects_duplicate_scenario_names() {
        let plan = RunPlan {
            scenarios: vec![constant("a", 1), constant("a", 2)],
            thresholds: Vec::new(),
        };
        assert!(matches!(plan.validate(), Err(Error::DuplicateScenario(_))));
    }

    #[test]
    fn validate_rejects_zero_vus() {
        let plan = RunPlan {
            scenarios: vec![constant("a", 0)],
            thresholds: Vec::new(),
        };
        assert!(matches!(plan.validate(), Err(Error::InvalidVus)));
    }

    #[test]
    fn validate_rejects_empty_stage_list() {
        let plan = RunPlan {
            scenarios: vec![ScenarioSpec {
                name: "ramp".to_string(),
                executor: Executor::RampingVus {
                    start_vus: 1,
                    stages: Vec::new(),
                },
                tags: Vec::new(),
            }],
            thresholds: Vec::new(),
        };
        assert!(matches!(plan.validate(), Err(Error::InvalidStages)));
    }

    #[test]
    fn validate_rejects_ramp_that_never_has_vus() {
        let plan = RunPlan {
            scenarios: vec![ScenarioSpec {
                name: "ramp".to_string(),
                executor: Executor::RampingVus {
                    start_vus: 0,
                    stages: vec![Stage {
                        duration: Duration::from_secs(1),
                        target: 0,
                    }],
                },
                tags: Vec::new(),
            }],
            thresholds: Vec::new(),
        };
        assert!(matches!(plan.validate(), Err(Error::InvalidVus)));
    }

    #[test]
    fn validate_rejects_malformed_threshold() {
        let plan = RunPlan {
            scenarios: vec![constant("a", 1)],
            thresholds: vec![ThresholdSpec {
                metric: "http_req_duration".to_string(),
                expressions: vec!["p95<500".to_string()],
            }],
        };
        assert!(matches!(
            plan.validate(),
            Err(Error::InvalidThreshold { .. })
        ));
    }

    #[test]
    fn validate_accepts_the_original_shape() {
        let plan = RunPlan {
            scenarios: vec![
                constant("constant_load", 50),
                ScenarioSpec {
                    name: "spike_test".to_string(),
                    executor: Executor::RampingVus {
                        start_vus: 0,
                        stages: vec![
                            Stage {
                                duration: Duration::from_secs(10),
                                target: 10,
                            },
                            Stage {
                                duration: Duration::from_secs(10),
                                target: 500,
                            },
                            Stage {
                                duration: Duration::from_secs(10),
                                target: 10,
                            },
                            Stage {
                                duration: Duration::from_secs(10),
                                target: 0,
                            },
                        ],
                    },
                    tags: vec![("scenario_kind".to_string(), "spike".to_string())],
                },
            ],
            thresholds: vec![
                ThresholdSpec {
                    metric: "http_req_duration".to_string(),
                    expressions: vec!["p(95)<500".to_string(), "p(99)<1000".to_string()],
                },
                ThresholdSpec {
                    metric: "http_req_failed".to_string(),
                    expressions: vec!["rate<0.01".to_string()],
                },
            ],
        };
        assert!(plan.validate().is_ok());
        assert_eq!(plan.total_vus(), 550);
    }

    #[test]
    fn executor_kind_parses_the_wire_names() {
        assert_eq!(
            "constant-vus".parse::<ExecutorKind>().ok(),
            Some(ExecutorKind::ConstantVus)
        );
        assert_eq!(
            "ramping-vus".parse::<ExecutorKind>().ok(),
            Some(ExecutorKind::RampingVus)
        );
        assert!("ramping-arrival-rate".parse::<ExecutorKind>().is_err());
    }
}

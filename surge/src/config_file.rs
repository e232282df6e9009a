use anyhow::Context as _;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

use surge_core::{Executor, ExecutorKind, RunPlan, ScenarioSpec, Stage, ThresholdSpec};

use crate::cli::RunArgs;

/// On-disk scenario config. Durations are humantime strings (`30s`, `1m`).
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub base_url: Option<String>,
    pub scenarios: BTreeMap<String, ScenarioEntry>,
    #[serde(default)]
    pub thresholds: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioEntry {
    #[serde(default)]
    pub executor: Option<String>,
    #[serde(default)]
    pub vus: Option<u64>,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub start_vus: Option<u64>,
    #[serde(default)]
    pub stages: Vec<StageEntry>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StageEntry {
    pub duration: String,
    pub target: u64,
}

pub fn parse(raw: &str) -> anyhow::Result<ConfigFile> {
    serde_yaml::from_str(raw).context("failed to parse scenario config")
}

/// Builds the run plan, applying CLI overrides. `--vus`/`--duration` have the
/// highest priority; when either is set, ramping scenarios are run with a
/// constant VU shape instead (the explicit run shape wins over the script's
/// ramp).
pub fn build_plan(file: &ConfigFile, args: &RunArgs) -> anyhow::Result<RunPlan> {
    for name in &args.scenarios {
        if !file.scenarios.contains_key(name) {
            anyhow::bail!("unknown scenario `{name}` (not present in the config file)");
        }
    }

    let cli_overrides_set = args.vus.is_some() || args.duration.is_some();

    let mut scenarios = Vec::with_capacity(file.scenarios.len());
    for (name, entry) in &file.scenarios {
        if !args.scenarios.is_empty() && !args.scenarios.contains(name) {
            continue;
        }

        let executor_name = entry.executor.as_deref().unwrap_or("constant-vus");
        let kind: ExecutorKind = executor_name
            .parse()
            .map_err(|_| surge_core::Error::InvalidExecutor)
            .with_context(|| format!("scenario `{name}`"))?;

        let executor = if kind == ExecutorKind::ConstantVus
            || (cli_overrides_set && kind == ExecutorKind::RampingVus)
        {
            let vus = args.vus.or(entry.vus).unwrap_or(1);
            let duration = match args.duration {
                Some(d) => d,
                None => {
                    let raw = entry.duration.as_deref().with_context(|| {
                        format!("scenario `{name}`: `duration` is required for constant-vus")
                    })?;
                    parse_duration(raw).with_context(|| format!("scenario `{name}`"))?
                }
            };
            Executor::ConstantVus { vus, duration }
        } else {
            let mut stages = Vec::with_capacity(entry.stages.len());
            for stage in &entry.stages {
                stages.push(Stage {
                    duration: parse_duration(&stage.duration)
                        .with_context(|| format!("scenario `{name}` stages"))?,
                    target: stage.target,
                });
            }
            Executor::RampingVus {
                start_vus: entry.start_vus.unwrap_or(0),
                stages,
            }
        };

        scenarios.push(ScenarioSpec {
            name: name.clone(),
            executor,
            tags: entry
                .tags
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        });
    }

    let thresholds = file
        .thresholds
        .iter()
        .map(|(metric, expressions)| ThresholdSpec {
            metric: metric.clone(),
            expressions: expressions.clone(),
        })
        .collect();

    let plan = RunPlan {
        scenarios,
        thresholds,
    };
    plan.validate()?;
    Ok(plan)
}

fn parse_duration(raw: &str) -> anyhow::Result<Duration> {
    humantime::parse_duration(raw.trim())
        .with_context(|| format!("invalid duration '{raw}' (expected e.g. 10s, 250ms, 1m)"))
}

use anyhow::Context as _;
use std::path::Path;
use std::sync::Arc;

use surge_core::{ProgressFn, Registry, RunPlan, ScenarioProgress, run_plan};

use crate::cli::{OutputFormat, RunArgs};
use crate::config_file;
use crate::exit_codes::ExitCode;
use crate::journey;
use crate::output;

const DEFAULT_BASE_URL: &str = "http://localhost:3000";

pub async fn run(args: RunArgs) -> anyhow::Result<ExitCode> {
    let (plan, base_url) = match prepare(&args).await {
        Ok(v) => v,
        Err(err) => {
            eprintln!("{err:#}");
            return Ok(ExitCode::InvalidInput);
        }
    };

    tracing::info!(
        config = %args.config.display(),
        base_url = %base_url,
        scenarios = plan.scenarios.len(),
        "run configured"
    );

    let registry = Arc::new(Registry::default());
    let progress = (args.output == OutputFormat::HumanReadable).then(progress_fn);

    let journey = journey::Journey::new(&base_url);
    let report = run_plan(
        plan,
        registry,
        journey.iteration_fn(),
        journey::hooks(&base_url),
        progress,
    )
    .await?;

    match args.output {
        OutputFormat::HumanReadable => print!("{}", output::human::render(&report)),
        OutputFormat::Json => {
            let doc = output::json::render(&report);
            println!(
                "{}",
                serde_json::to_string_pretty(&doc).context("failed to serialize summary")?
            );
        }
    }

    if let Some(path) = &args.summary_out {
        let doc = output::json::render(&report);
        output::write_summary_file(path, &doc)?;
    }

    print_threshold_failures(&report);

    Ok(ExitCode::from_quality_gates(
        !report.checks_passed(),
        !report.thresholds_passed(),
    ))
}

async fn prepare(args: &RunArgs) -> anyhow::Result<(RunPlan, String)> {
    let raw = read_config(&args.config).await?;
    let file = config_file::parse(&raw)?;

    let base_url = args
        .base_url
        .clone()
        .or_else(|| file.base_url.clone())
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

    let plan = config_file::build_plan(&file, args)?;
    Ok((plan, base_url))
}

async fn read_config(path: &Path) -> anyhow::Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read config: {}", path.display()))
}

fn progress_fn() -> ProgressFn {
    Arc::new(|update| {
        let target = match &update.progress {
            ScenarioProgress::ConstantVus { vus, .. } => *vus,
            ScenarioProgress::RampingVus { stage, .. } => stage
                .as_ref()
                .map(|s| s.current_target)
                .unwrap_or_default(),
        };
        eprintln!(
            "[{:>4}s] {}: vus={}/{} iterations={} ({:.1}/s)",
            update.elapsed.as_secs(),
            update.scenario,
            update.active_vus,
            target,
            update.iterations_total,
            update.iterations_per_sec_now,
        );
    })
}

fn print_threshold_failures(report: &surge_core::RunReport) {
    let failed: Vec<_> = report.thresholds.iter().filter(|t| !t.passed).collect();
    if failed.is_empty() {
        return;
    }

    eprintln!("thresholds_failed: {}", failed.len());
    for t in failed {
        match t.observed {
            Some(observed) => eprintln!(
                "threshold_failed: metric={} expr={} observed={observed}",
                t.metric, t.expression
            ),
            None => eprintln!(
                "threshold_failed: metric={} expr={} observed=-",
                t.metric, t.expression
            ),
        }
    }
}

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

fn parse_duration(input: &str) -> Result<Duration, String> {
    humantime::parse_duration(input.trim())
        .map_err(|err| format!("invalid duration '{input}' (expected e.g. 10s, 250ms, 1m): {err}"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable summary.
    HumanReadable,
    /// Emit the summary as a JSON document to stdout.
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "surge",
    author,
    version,
    about = "Scenario-driven HTTP load testing tool",
    long_about = "surge drives configurable concurrent workloads (virtual users) against an HTTP target.\n\nA scenario file declares named scenarios (constant-vus or ramping-vus executors) and pass/fail thresholds over the collected metrics. Each virtual user repeatedly runs the built-in request journey against the target base URL.",
    after_help = "Examples:\n  surge run scenarios.yaml\n  surge run scenarios.yaml --vus 50 --duration 30s\n  surge run scenarios.yaml --base-url http://localhost:3000 --output json\n  surge run scenarios.yaml --summary-out summary.json"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the scenarios from a config file.
    Run(RunArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Scenario config file (YAML).
    pub config: PathBuf,

    /// Target base URL (overrides the config file).
    #[arg(long, env = "BASE_URL")]
    pub base_url: Option<String>,

    /// Override every scenario to run with this many VUs.
    #[arg(long)]
    pub vus: Option<u64>,

    /// Override every scenario to run for this duration.
    #[arg(long, value_parser = parse_duration)]
    pub duration: Option<Duration>,

    /// Only run the named scenarios (repeatable).
    #[arg(long = "scenario")]
    pub scenarios: Vec<String>,

    #[arg(long, value_enum, default_value_t = OutputFormat::HumanReadable)]
    pub output: OutputFormat,

    /// Also write the JSON summary to this file.
    #[arg(long)]
    pub summary_out: Option<PathBuf>,
}

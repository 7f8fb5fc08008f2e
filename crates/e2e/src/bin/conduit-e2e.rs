//! Conduit smoke suite runner
//!
//! Runs the smoke scenarios against a live deployment and writes
//! `test-results.json`. Exit code 0 when everything passed, 1 when a
//! scenario failed, 2 when the suite could not run at all.

use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use conduit_common::HarnessConfig;
use conduit_e2e::runner::{RunnerConfig, ScenarioRunner};
use conduit_e2e::{catalog, smoke, E2eResult};

#[derive(Parser, Debug)]
#[command(name = "conduit-e2e", version = conduit_common::VERSION)]
#[command(about = "Fixture-driven smoke tests for a Conduit deployment")]
struct Args {
    /// TOML file with harness settings; environment variables override it
    #[arg(short, long, env = "E2E_CONFIG")]
    config: Option<PathBuf>,

    /// Conduit API base URL
    #[arg(long)]
    api_url: Option<String>,

    /// Front-end base URL
    #[arg(long)]
    base_url: Option<String>,

    /// Run only scenarios with this tag
    #[arg(short, long)]
    tag: Option<String>,

    /// Run only the scenario with this name
    #[arg(short, long)]
    name: Option<String>,

    /// Scenarios to run at the same time
    #[arg(short, long, env = "E2E_PARALLELISM", default_value = "4")]
    parallelism: usize,

    /// Output directory for results
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print the scenarios and their fixtures, then exit
    #[arg(long)]
    list: bool,

    /// Emit JSON log lines
    #[arg(long)]
    json_logs: bool,
}

fn main() {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if args.json_logs {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: failed to create tokio runtime: {}", e);
            std::process::exit(2);
        }
    };

    match rt.block_on(async_main(args)) {
        Ok(true) => std::process::exit(0),
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(2);
        }
    }
}

/// File, then environment, then flags; validated once all are merged
fn harness_config<F>(args: &Args, env: F) -> E2eResult<HarnessConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let base = match &args.config {
        Some(path) => HarnessConfig::load(path)?,
        None => HarnessConfig::default(),
    };
    let mut config = base.with_overrides(env)?;

    if let Some(api_url) = &args.api_url {
        config.api_url = api_url.clone();
    }
    if let Some(base_url) = &args.base_url {
        config.base_url = base_url.clone();
    }
    if let Some(output) = &args.output {
        config.results_dir = output.clone();
    }
    config.validate()?;
    Ok(config)
}

async fn async_main(args: Args) -> E2eResult<bool> {
    let harness = harness_config(&args, |key| std::env::var(key).ok())?;
    let registry = catalog::standard_registry()?;
    let scenarios = smoke::smoke_scenarios();

    if args.list {
        for scenario in &scenarios {
            println!(
                "{:<45} [{}] fixtures: {}",
                scenario.name,
                scenario.tags.join(", "),
                scenario.fixtures.join(", ")
            );
        }
        return Ok(true);
    }

    info!("conduit-e2e {}", conduit_common::VERSION);
    info!("Conduit API: {}", harness.api_url);
    info!("Front end:   {}", harness.base_url);

    let config = RunnerConfig {
        parallelism: args.parallelism,
        tag: args.tag,
        name: args.name,
        ..RunnerConfig::from_harness(&harness)
    };
    let runner = ScenarioRunner::new(registry, harness, config);

    let report = runner.run(scenarios).await;
    runner.write_results(&report)?;

    Ok(report.success())
}

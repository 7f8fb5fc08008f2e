//! Suite runner: many scenarios, each in its own lifecycle controller

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use conduit_common::HarnessConfig;

use crate::error::{E2eResult, TeardownFailure};
use crate::fixture::lifecycle::panic_message;
use crate::fixture::{FixtureRegistry, FixtureSet, RunJournal, ScenarioEnv, ScenarioRun};

type ScenarioBody = dyn Fn(FixtureSet) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync;

/// A named scenario: the fixtures it needs and the body that uses them
#[derive(Clone)]
pub struct Scenario {
    pub name: String,
    pub tags: Vec<String>,
    pub fixtures: Vec<String>,
    body: Arc<ScenarioBody>,
}

impl Scenario {
    pub fn new<F, Fut>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(FixtureSet) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            name: name.into(),
            tags: Vec::new(),
            fixtures: Vec::new(),
            body: Arc::new(move |fixtures| body(fixtures).boxed()),
        }
    }

    pub fn with_fixtures<I, S>(mut self, fixtures: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fixtures.extend(fixtures.into_iter().map(Into::into));
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

impl fmt::Debug for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scenario")
            .field("name", &self.name)
            .field("tags", &self.tags)
            .field("fixtures", &self.fixtures)
            .finish()
    }
}

/// Result of running a single scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioReport {
    pub name: String,
    pub success: bool,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub provisioned: Vec<String>,
    pub torn_down: Vec<String>,
    pub teardown_failures: Vec<TeardownFailure>,
    pub error: Option<String>,
}

impl ScenarioReport {
    fn task_lost(name: String, cause: &str) -> Self {
        Self {
            name,
            success: false,
            started_at: Utc::now(),
            duration_ms: 0,
            provisioned: Vec::new(),
            torn_down: Vec::new(),
            teardown_failures: Vec::new(),
            error: Some(format!("scenario task did not complete: {}", cause)),
        }
    }
}

/// Result of running a suite
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteReport {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub duration_ms: u64,
    pub results: Vec<ScenarioReport>,
}

impl SuiteReport {
    pub fn success(&self) -> bool {
        self.failed == 0
    }

    pub fn result(&self, name: &str) -> Option<&ScenarioReport> {
        self.results.iter().find(|r| r.name == name)
    }
}

/// Configuration for the scenario runner
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Scenarios allowed to run at the same time
    pub parallelism: usize,
    /// Only run scenarios carrying this tag
    pub tag: Option<String>,
    /// Only run the scenario with this name
    pub name: Option<String>,
    pub output_dir: PathBuf,
}

impl RunnerConfig {
    pub fn from_harness(config: &HarnessConfig) -> Self {
        Self {
            output_dir: config.results_dir.clone(),
            ..Self::default()
        }
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            parallelism: 4,
            tag: None,
            name: None,
            output_dir: PathBuf::from("test-results"),
        }
    }
}

/// Runs scenarios concurrently against one shared, read-only registry
pub struct ScenarioRunner {
    registry: Arc<FixtureRegistry>,
    harness: Arc<HarnessConfig>,
    config: RunnerConfig,
}

impl ScenarioRunner {
    pub fn new(registry: FixtureRegistry, harness: HarnessConfig, config: RunnerConfig) -> Self {
        Self {
            registry: Arc::new(registry),
            harness: Arc::new(harness),
            config,
        }
    }

    pub fn registry(&self) -> &FixtureRegistry {
        &self.registry
    }

    fn selected(&self, scenario: &Scenario) -> bool {
        let tag_ok = self.config.tag.as_deref().map_or(true, |tag| scenario.has_tag(tag));
        let name_ok = self.config.name.as_deref().map_or(true, |name| scenario.name == name);
        tag_ok && name_ok
    }

    /// Run every selected scenario. Failing scenarios are reported, never
    /// propagated; results keep the order of `scenarios`.
    pub async fn run(&self, scenarios: Vec<Scenario>) -> SuiteReport {
        let start = Instant::now();
        let selected: Vec<Scenario> = scenarios.into_iter().filter(|s| self.selected(s)).collect();
        let total = selected.len();

        info!(
            "Running {} scenario(s) with parallelism {}...",
            total, self.config.parallelism
        );

        let names: Vec<String> = selected.iter().map(|s| s.name.clone()).collect();
        let permits = Arc::new(Semaphore::new(self.config.parallelism.max(1)));
        let mut tasks = JoinSet::new();

        for (idx, scenario) in selected.into_iter().enumerate() {
            let registry = self.registry.clone();
            let harness = self.harness.clone();
            let permits = permits.clone();
            tasks.spawn(async move {
                // The semaphore is never closed
                let _permit = permits.acquire_owned().await.ok();
                (idx, run_scenario(scenario, registry, harness).await)
            });
        }

        let mut finished: Vec<(usize, ScenarioReport)> = Vec::with_capacity(total);
        let mut lost = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(entry) => finished.push(entry),
                // run_scenario catches panics itself, so this is a cancelled task
                Err(e) => {
                    error!("Scenario task failed: {}", e);
                    lost.push(e.to_string());
                }
            }
        }
        let results = collate(names, finished, &lost.join("; "));

        let passed = results.iter().filter(|r| r.success).count();
        let failed = total - passed;
        let duration_ms = start.elapsed().as_millis() as u64;

        info!("");
        info!(
            "Scenario Results: {} passed, {} failed ({} ms)",
            passed, failed, duration_ms
        );

        SuiteReport {
            total,
            passed,
            failed,
            duration_ms,
            results,
        }
    }

    /// Write the suite report as `test-results.json` under the output dir
    pub fn write_results(&self, report: &SuiteReport) -> E2eResult<PathBuf> {
        write_results(&self.config.output_dir, report)
    }
}

/// Reports in scenario order. A scenario whose task ended without a report
/// is recorded as failed with `cause`.
fn collate(names: Vec<String>, finished: Vec<(usize, ScenarioReport)>, cause: &str) -> Vec<ScenarioReport> {
    let mut slots: Vec<Option<ScenarioReport>> = names.iter().map(|_| None).collect();
    for (idx, report) in finished {
        if let Some(slot) = slots.get_mut(idx) {
            *slot = Some(report);
        }
    }

    names
        .into_iter()
        .zip(slots)
        .map(|(name, slot)| slot.unwrap_or_else(|| ScenarioReport::task_lost(name, cause)))
        .collect()
}

/// Write `report` as pretty JSON to `<dir>/test-results.json`
pub fn write_results(dir: &Path, report: &SuiteReport) -> E2eResult<PathBuf> {
    std::fs::create_dir_all(dir)?;

    let path = dir.join("test-results.json");
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(&path, json)?;

    info!("Results written to: {}", path.display());
    Ok(path)
}

async fn run_scenario(
    scenario: Scenario,
    registry: Arc<FixtureRegistry>,
    harness: Arc<HarnessConfig>,
) -> ScenarioReport {
    let started_at = Utc::now();
    let start = Instant::now();
    debug!("Running scenario: {}", scenario.name);

    let (error, journal) = match ScenarioEnv::new(harness) {
        Ok(env) => {
            let mut run = ScenarioRun::new(scenario.name.clone(), registry, env);
            let body = scenario.body.clone();
            let outcome = AssertUnwindSafe(run.execute(&scenario.fixtures, |fixtures| body(fixtures)))
                .catch_unwind()
                .await;
            let error = match outcome {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(format!("{:#}", e)),
                Err(payload) => Some(format!("panicked: {}", panic_message(payload.as_ref()))),
            };
            (error, run.journal().clone())
        }
        Err(e) => (Some(e.to_string()), RunJournal::default()),
    };

    let duration_ms = start.elapsed().as_millis() as u64;
    match &error {
        None => info!("✓ {} ({} ms)", scenario.name, duration_ms),
        Some(e) => error!("✗ {} - {}", scenario.name, e),
    }

    ScenarioReport {
        name: scenario.name,
        success: error.is_none(),
        started_at,
        duration_ms,
        provisioned: journal.provisioned,
        torn_down: journal.torn_down,
        teardown_failures: journal.teardown_failures,
        error,
    }
}

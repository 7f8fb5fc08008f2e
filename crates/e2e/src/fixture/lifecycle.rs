//! Per-scenario lifecycle controller
//!
//! A `ScenarioRun` owns everything one scenario provisions. Provisioning is
//! strictly sequential in resolved order; teardown is the exact mirror image
//! and always runs, whether the body returns `Ok`, returns `Err` or panics.

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::error::{E2eError, E2eResult, TeardownFailure};
use crate::fixture::definition::{FixtureDefinition, FixtureValue};
use crate::fixture::registry::FixtureRegistry;
use crate::fixture::scope::{FixtureScope, FixtureSet, ScenarioEnv};

/// Lifecycle state of one scenario run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Idle,
    Provisioning,
    Running,
    TearingDown,
    Done,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunPhase::Idle => "idle",
            RunPhase::Provisioning => "provisioning",
            RunPhase::Running => "running",
            RunPhase::TearingDown => "tearing_down",
            RunPhase::Done => "done",
        };
        f.write_str(name)
    }
}

/// What happened during a run, in order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunJournal {
    /// Fixtures in the order they were provisioned
    pub provisioned: Vec<String>,
    /// Fixtures whose teardown step was invoked, in invocation order
    pub torn_down: Vec<String>,
    pub teardown_failures: Vec<TeardownFailure>,
}

/// A definition paired with the value it produced in this run
struct ResolvedFixture {
    definition: Arc<FixtureDefinition>,
    value: FixtureValue,
    scope: FixtureScope,
}

/// How a provisioning step or the body ended
enum Outcome<T> {
    Ok(T),
    Failed(anyhow::Error),
    Panicked(Box<dyn Any + Send>),
}

async fn guarded<T, Fut>(fut: Fut) -> Outcome<T>
where
    Fut: Future<Output = anyhow::Result<T>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(Ok(value)) => Outcome::Ok(value),
        Ok(Err(err)) => Outcome::Failed(err),
        Err(payload) => Outcome::Panicked(payload),
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Lifecycle controller for one scenario
pub struct ScenarioRun {
    name: String,
    registry: Arc<FixtureRegistry>,
    env: ScenarioEnv,
    phase: RunPhase,
    /// Memoization table: provisioned fixtures in provisioning order
    instantiated: Vec<ResolvedFixture>,
    by_name: HashMap<String, usize>,
    /// Sessions opened before the body started belong to fixtures
    session_mark: usize,
    journal: RunJournal,
}

impl ScenarioRun {
    pub fn new(name: impl Into<String>, registry: Arc<FixtureRegistry>, env: ScenarioEnv) -> Self {
        Self {
            name: name.into(),
            registry,
            env,
            phase: RunPhase::Idle,
            instantiated: Vec::new(),
            by_name: HashMap::new(),
            session_mark: 0,
            journal: RunJournal::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn journal(&self) -> &RunJournal {
        &self.journal
    }

    pub fn env(&self) -> &ScenarioEnv {
        &self.env
    }

    fn transition(&mut self, expected: RunPhase, to: RunPhase) -> E2eResult<()> {
        if self.phase != expected {
            return Err(E2eError::InvalidTransition {
                from: self.phase,
                to,
            });
        }
        debug!("[{}] {} -> {}", self.name, self.phase, to);
        self.phase = to;
        Ok(())
    }

    /// Provision `names` and everything they depend on.
    ///
    /// Resolution errors end the run before any side effect. If a
    /// provisioning step fails, the fixtures already provisioned are torn
    /// down in reverse order and the original error is returned; a panic is
    /// resumed after that teardown. On success the run is `Running` and the
    /// returned set holds the requested names.
    pub async fn request<S: AsRef<str>>(&mut self, names: &[S]) -> anyhow::Result<FixtureSet> {
        self.transition(RunPhase::Idle, RunPhase::Provisioning)?;

        let order = match self.registry.resolve(names) {
            Ok(order) => order,
            Err(err) => {
                warn!("[{}] fixture resolution failed: {}", self.name, err);
                self.phase = RunPhase::Done;
                return Err(err.into());
            }
        };
        info!(
            "[{}] provisioning {} fixture(s): {}",
            self.name,
            order.len(),
            order.iter().map(|d| d.name()).collect::<Vec<_>>().join(", ")
        );

        for definition in order {
            if self.by_name.contains_key(definition.name()) {
                continue;
            }

            let dependencies = definition
                .dependencies()
                .iter()
                .filter_map(|dep| {
                    self.by_name
                        .get(dep)
                        .map(|&idx| (dep.clone(), self.instantiated[idx].value.clone()))
                })
                .collect();
            let scope = FixtureScope::new(definition.name(), dependencies, self.env.clone());

            debug!("[{}] provisioning {}", self.name, definition.name());
            match guarded(definition.provision(scope.clone())).await {
                Outcome::Ok(value) => {
                    self.by_name
                        .insert(definition.name().to_string(), self.instantiated.len());
                    self.journal.provisioned.push(definition.name().to_string());
                    self.instantiated.push(ResolvedFixture {
                        definition,
                        value,
                        scope,
                    });
                }
                Outcome::Failed(err) => {
                    error!("[{}] provisioning {} failed: {:#}", self.name, definition.name(), err);
                    self.abort_provisioning().await;
                    return Err(err);
                }
                Outcome::Panicked(payload) => {
                    error!(
                        "[{}] provisioning {} panicked: {}",
                        self.name,
                        definition.name(),
                        panic_message(payload.as_ref())
                    );
                    self.abort_provisioning().await;
                    panic::resume_unwind(payload);
                }
            }
        }

        let mut values = HashMap::new();
        for name in names {
            let name = name.as_ref();
            if let Some(&idx) = self.by_name.get(name) {
                values.insert(name.to_string(), self.instantiated[idx].value.clone());
            }
        }

        self.session_mark = self.env.sessions().opened_count();
        self.transition(RunPhase::Provisioning, RunPhase::Running)?;
        Ok(FixtureSet::new(values, self.env.clone()))
    }

    async fn abort_provisioning(&mut self) {
        self.phase = RunPhase::TearingDown;
        self.session_mark = self.env.sessions().opened_count();
        self.run_teardown().await;
        self.phase = RunPhase::Done;
    }

    /// Tear down every provisioned fixture, newest first.
    ///
    /// Every step is attempted even if earlier ones fail; failures come back
    /// as one aggregate `E2eError::Teardown`.
    pub async fn teardown(&mut self) -> E2eResult<()> {
        self.transition(RunPhase::Running, RunPhase::TearingDown)?;
        let failures = self.run_teardown().await;
        self.transition(RunPhase::TearingDown, RunPhase::Done)?;

        if failures.is_empty() {
            Ok(())
        } else {
            Err(E2eError::Teardown { failures })
        }
    }

    async fn run_teardown(&mut self) -> Vec<TeardownFailure> {
        // Sessions the body opened are newer than every fixture
        self.env.sessions().close_opened_since(self.session_mark);

        let mut failures = Vec::new();
        let instantiated = std::mem::take(&mut self.instantiated);
        self.by_name.clear();

        for resolved in instantiated.into_iter().rev() {
            let name = resolved.definition.name().to_string();
            let Some(step) = resolved.definition.teardown(resolved.scope, resolved.value) else {
                continue;
            };

            debug!("[{}] tearing down {}", self.name, name);
            self.journal.torn_down.push(name.clone());

            let error = match guarded(step).await {
                Outcome::Ok(()) => continue,
                Outcome::Failed(err) => format!("{:#}", err),
                Outcome::Panicked(payload) => {
                    format!("teardown panicked: {}", panic_message(payload.as_ref()))
                }
            };
            warn!("[{}] teardown of {} failed: {}", self.name, name, error);
            failures.push(TeardownFailure {
                fixture: name,
                error,
            });
        }

        let leftover = self.env.sessions().close_all();
        if leftover > 0 {
            debug!("[{}] closed {} fixture session(s)", self.name, leftover);
        }

        self.journal.teardown_failures.extend(failures.iter().cloned());
        failures
    }

    /// Provision `names`, run `body`, then tear down unconditionally.
    ///
    /// The body's error is returned unchanged after teardown, and a body
    /// panic is resumed after teardown. Only when the body succeeds do
    /// teardown failures become the result.
    pub async fn execute<S, F, Fut, T>(&mut self, names: &[S], body: F) -> anyhow::Result<T>
    where
        S: AsRef<str>,
        F: FnOnce(FixtureSet) -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let fixtures = self.request(names).await?;

        info!("[{}] running scenario body", self.name);
        let outcome = guarded(body(fixtures)).await;
        let teardown = self.teardown().await;

        match outcome {
            Outcome::Panicked(payload) => {
                error!(
                    "[{}] scenario body panicked: {}",
                    self.name,
                    panic_message(payload.as_ref())
                );
                panic::resume_unwind(payload)
            }
            Outcome::Failed(err) => {
                if let Err(teardown_err) = teardown {
                    warn!("[{}] {} (reported after body failure)", self.name, teardown_err);
                }
                Err(err)
            }
            Outcome::Ok(value) => {
                teardown?;
                info!("[{}] scenario passed", self.name);
                Ok(value)
            }
        }
    }
}

impl Drop for ScenarioRun {
    fn drop(&mut self) {
        if !self.instantiated.is_empty() {
            let leaked: Vec<&str> = self.instantiated.iter().map(|r| r.definition.name()).collect();
            error!(
                "[{}] dropped in phase {} without teardown; leaked fixtures: {}",
                self.name,
                self.phase,
                leaked.join(", ")
            );
        }
        self.env.sessions().close_all();
    }
}

impl fmt::Debug for ScenarioRun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScenarioRun")
            .field("name", &self.name)
            .field("phase", &self.phase)
            .field("journal", &self.journal)
            .finish()
    }
}

//! Values and collaborators visible to fixtures and scenario bodies

use std::any::type_name;
use std::collections::HashMap;
use std::sync::Arc;

use conduit_common::HarnessConfig;

use crate::api::ResourceClient;
use crate::error::{E2eError, E2eResult};
use crate::fixture::definition::FixtureValue;
use crate::session::SessionFactory;

/// Per-run collaborators, threaded explicitly into every provisioning step.
///
/// Each `ScenarioRun` builds its own environment, so API clients and opened
/// sessions never leak between scenarios running in parallel.
#[derive(Debug, Clone)]
pub struct ScenarioEnv {
    config: Arc<HarnessConfig>,
    api: ResourceClient,
    sessions: SessionFactory,
}

impl ScenarioEnv {
    pub fn new(config: Arc<HarnessConfig>) -> E2eResult<Self> {
        let api = ResourceClient::new(&config)?;
        let sessions = SessionFactory::new(&config);
        Ok(Self {
            config,
            api,
            sessions,
        })
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn api(&self) -> &ResourceClient {
        &self.api
    }

    pub fn sessions(&self) -> &SessionFactory {
        &self.sessions
    }
}

fn typed<T: Send + Sync + 'static>(name: &str, value: &FixtureValue) -> E2eResult<Arc<T>> {
    value
        .clone()
        .downcast::<T>()
        .map_err(|_| E2eError::FixtureTypeMismatch {
            name: name.to_string(),
            expected: type_name::<T>(),
        })
}

/// What a provisioning or teardown step can see: its declared
/// dependencies plus the run environment
#[derive(Debug, Clone)]
pub struct FixtureScope {
    fixture: Arc<str>,
    dependencies: Arc<HashMap<String, FixtureValue>>,
    env: ScenarioEnv,
}

impl FixtureScope {
    pub(crate) fn new(fixture: &str, dependencies: HashMap<String, FixtureValue>, env: ScenarioEnv) -> Self {
        Self {
            fixture: Arc::from(fixture),
            dependencies: Arc::new(dependencies),
            env,
        }
    }

    /// Name of the fixture this scope belongs to
    pub fn fixture(&self) -> &str {
        &self.fixture
    }

    /// Value of a declared dependency
    pub fn get<T: Send + Sync + 'static>(&self, name: &str) -> E2eResult<Arc<T>> {
        let value = self
            .dependencies
            .get(name)
            .ok_or_else(|| E2eError::FixtureNotInScope(name.to_string()))?;
        typed(name, value)
    }

    pub fn env(&self) -> &ScenarioEnv {
        &self.env
    }

    pub fn config(&self) -> &HarnessConfig {
        self.env.config()
    }

    pub fn api(&self) -> &ResourceClient {
        self.env.api()
    }

    pub fn sessions(&self) -> &SessionFactory {
        self.env.sessions()
    }
}

/// Fixtures handed to a scenario body, keyed by the names it requested
#[derive(Debug, Clone)]
pub struct FixtureSet {
    values: HashMap<String, FixtureValue>,
    env: ScenarioEnv,
}

impl FixtureSet {
    pub(crate) fn new(values: HashMap<String, FixtureValue>, env: ScenarioEnv) -> Self {
        Self { values, env }
    }

    pub fn get<T: Send + Sync + 'static>(&self, name: &str) -> E2eResult<Arc<T>> {
        let value = self
            .values
            .get(name)
            .ok_or_else(|| E2eError::FixtureNotInScope(name.to_string()))?;
        typed(name, value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn env(&self) -> &ScenarioEnv {
        &self.env
    }

    pub fn api(&self) -> &ResourceClient {
        self.env.api()
    }

    pub fn sessions(&self) -> &SessionFactory {
        self.env.sessions()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env() -> ScenarioEnv {
        ScenarioEnv::new(Arc::new(HarnessConfig::default())).unwrap()
    }

    #[test]
    fn test_scope_typed_access() {
        let mut deps: HashMap<String, FixtureValue> = HashMap::new();
        deps.insert("count".into(), Arc::new(7u64));
        let scope = FixtureScope::new("consumer", deps, env());

        assert_eq!(*scope.get::<u64>("count").unwrap(), 7);
        assert!(matches!(
            scope.get::<String>("count"),
            Err(E2eError::FixtureTypeMismatch { .. })
        ));
        assert!(matches!(
            scope.get::<u64>("undeclared"),
            Err(E2eError::FixtureNotInScope(_))
        ));
    }
}

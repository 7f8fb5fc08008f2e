//! Fixture registry and dependency resolver

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

use crate::error::{E2eError, E2eResult};
use crate::fixture::definition::FixtureDefinition;

/// Requester name used in errors for names asked for directly by a scenario
const SCENARIO: &str = "scenario";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// All fixtures known to the process, in registration order
#[derive(Debug, Default)]
pub struct FixtureRegistry {
    definitions: Vec<Arc<FixtureDefinition>>,
    index: HashMap<String, usize>,
}

impl FixtureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fixture. Dependencies are only checked at resolve time,
    /// so fixtures may refer to ones registered later.
    pub fn register(&mut self, definition: FixtureDefinition) -> E2eResult<()> {
        if self.index.contains_key(definition.name()) {
            return Err(E2eError::DuplicateFixture(definition.name().to_string()));
        }

        debug!(
            "Registered fixture {} (deps: [{}])",
            definition.name(),
            definition.dependencies().join(", ")
        );
        self.index.insert(definition.name().to_string(), self.definitions.len());
        self.definitions.push(Arc::new(definition));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<FixtureDefinition>> {
        self.index.get(name).map(|&idx| &self.definitions[idx])
    }

    /// Registered names in registration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.definitions.iter().map(|d| d.name())
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Order the transitive closure of `requested` for provisioning.
    ///
    /// Every fixture comes after all of its dependencies. Among fixtures
    /// that are ready at the same time, the one registered first wins, so
    /// the order is reproducible. Each fixture appears once however many
    /// times it is requested or depended upon.
    pub fn resolve<S: AsRef<str>>(&self, requested: &[S]) -> E2eResult<Vec<Arc<FixtureDefinition>>> {
        let mut marks: HashMap<usize, Mark> = HashMap::new();
        let mut path: Vec<usize> = Vec::new();

        for name in requested {
            let idx = self.lookup(name.as_ref(), SCENARIO)?;
            self.visit(idx, &mut marks, &mut path)?;
        }

        let mut pending: BTreeSet<usize> = marks.into_keys().collect();
        let mut emitted: HashSet<usize> = HashSet::with_capacity(pending.len());
        let mut order = Vec::with_capacity(pending.len());

        while let Some(next) = pending.iter().copied().find(|&idx| self.is_ready(idx, &emitted)) {
            pending.remove(&next);
            emitted.insert(next);
            order.push(self.definitions[next].clone());
        }

        // visit() already rejects cycles; anything left over means one slipped through
        if !pending.is_empty() {
            return Err(E2eError::CyclicDependency {
                path: pending
                    .into_iter()
                    .map(|idx| self.definitions[idx].name().to_string())
                    .collect(),
            });
        }

        Ok(order)
    }

    fn lookup(&self, name: &str, required_by: &str) -> E2eResult<usize> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| E2eError::UnknownFixture {
                name: name.to_string(),
                required_by: required_by.to_string(),
            })
    }

    fn is_ready(&self, idx: usize, emitted: &HashSet<usize>) -> bool {
        self.definitions[idx]
            .dependencies()
            .iter()
            .all(|dep| self.index.get(dep).is_some_and(|d| emitted.contains(d)))
    }

    fn visit(&self, idx: usize, marks: &mut HashMap<usize, Mark>, path: &mut Vec<usize>) -> E2eResult<()> {
        match marks.get(&idx) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                let start = path.iter().position(|&n| n == idx).unwrap_or(0);
                let mut cycle: Vec<String> = path[start..]
                    .iter()
                    .map(|&n| self.definitions[n].name().to_string())
                    .collect();
                cycle.push(self.definitions[idx].name().to_string());
                return Err(E2eError::CyclicDependency { path: cycle });
            }
            None => {}
        }

        marks.insert(idx, Mark::Visiting);
        path.push(idx);

        let definition = &self.definitions[idx];
        for dep in definition.dependencies() {
            let dep_idx = self.lookup(dep, definition.name())?;
            self.visit(dep_idx, marks, path)?;
        }

        path.pop();
        marks.insert(idx, Mark::Done);
        Ok(())
    }
}

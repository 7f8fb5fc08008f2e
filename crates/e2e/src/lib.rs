//! Conduit E2E Fixture Engine
//!
//! This crate provisions test data for end-to-end scenarios against a
//! RealWorld "Conduit" deployment and guarantees it is cleaned up again:
//! - Named fixtures with declared dependencies, resolved per scenario
//! - Each fixture provisioned at most once per scenario and shared
//! - Reverse-order teardown whether the body passes, fails or panics
//! - Isolated sessions so several actors can work in one scenario
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  ScenarioRunner (JoinSet)                   │
//! │    └── per scenario: ScenarioRun                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ScenarioRun                                                │
//! │    ├── request(names) -> FixtureSet                         │
//! │    │     └── FixtureRegistry::resolve(names)                │
//! │    ├── body(FixtureSet)                                     │
//! │    └── teardown()  (reverse provisioning order)             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ScenarioEnv (one per run)                                  │
//! │    ├── ResourceClient   create/delete users and articles    │
//! │    └── SessionFactory   isolated cookie jar + storage       │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod catalog;
pub mod error;
pub mod fixture;
pub mod runner;
pub mod session;
pub mod smoke;

pub use api::{DeleteOutcome, ResourceClient};
pub use error::{E2eError, E2eResult, TeardownFailure};
pub use fixture::{
    FixtureDefinition, FixtureRegistry, FixtureScope, FixtureSet, RunJournal, RunPhase, ScenarioEnv,
    ScenarioRun,
};
pub use runner::{Scenario, ScenarioReport, ScenarioRunner, SuiteReport};
pub use session::{Session, SessionFactory, SessionUser};

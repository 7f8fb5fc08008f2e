//! Fixture engine
//!
//! ```text
//! FixtureRegistry ──resolve(names)──▶ ordered [FixtureDefinition]
//!        │
//!        ▼
//! ScenarioRun:  Idle ─▶ Provisioning ─▶ Running ─▶ TearingDown ─▶ Done
//!                           │                           ▲
//!                           └──── provisioning error ───┘
//! ```
//!
//! Fixtures are declared once in a registry shared by every scenario. Each
//! scenario gets its own `ScenarioRun`, which provisions the transitive
//! closure of what the scenario asks for, memoizes every value by name, and
//! tears everything down in reverse order no matter how the body ends.

pub mod definition;
pub mod lifecycle;
pub mod registry;
pub mod scope;

pub use definition::{FixtureDefinition, FixtureValue};
pub use lifecycle::{RunJournal, RunPhase, ScenarioRun};
pub use registry::FixtureRegistry;
pub use scope::{FixtureScope, FixtureSet, ScenarioEnv};

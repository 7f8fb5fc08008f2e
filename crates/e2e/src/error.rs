//! Error types for the fixture engine

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::fixture::RunPhase;

#[derive(Error, Debug)]
pub enum E2eError {
    #[error("Configuration error: {0}")]
    Config(#[from] conduit_common::Error),

    #[error("Fixture already registered: {0}")]
    DuplicateFixture(String),

    #[error("Unknown fixture '{name}' (required by {required_by})")]
    UnknownFixture { name: String, required_by: String },

    #[error("Cyclic fixture dependency: {}", .path.join(" -> "))]
    CyclicDependency { path: Vec<String> },

    #[error("Fixture '{0}' is not available in this scope")]
    FixtureNotInScope(String),

    #[error("Fixture '{name}' does not hold a value of type {expected}")]
    FixtureTypeMismatch { name: String, expected: &'static str },

    #[error("Provisioning failed: {operation} returned {status} (expected {expected}): {body}")]
    Provisioning {
        operation: String,
        status: u16,
        expected: u16,
        body: String,
    },

    #[error("Request failed: {operation} returned {status}: {body}")]
    UnexpectedStatus {
        operation: String,
        status: u16,
        body: String,
    },

    #[error("Teardown request failed: {operation} returned {status}: {body}")]
    TeardownRequest {
        operation: String,
        status: u16,
        body: String,
    },

    #[error("{} teardown step(s) failed: {}", .failures.len(), join_failures(.failures))]
    Teardown { failures: Vec<TeardownFailure> },

    #[error("Authentication failed for {email}: status {status}")]
    Authentication { email: String, status: u16 },

    #[error("Session {0} is not signed in")]
    NotSignedIn(String),

    #[error("Session {0} is closed")]
    SessionClosed(String),

    #[error("Invalid lifecycle transition: {from} -> {to}")]
    InvalidTransition { from: RunPhase, to: RunPhase },

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type E2eResult<T> = Result<T, E2eError>;

/// One teardown step that did not complete
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeardownFailure {
    pub fixture: String,
    pub error: String,
}

impl fmt::Display for TeardownFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.fixture, self.error)
    }
}

fn join_failures(failures: &[TeardownFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

//! Conduit E2E Common Library
//!
//! Shared types, configuration and test data for the fixture engine.

pub mod config;
pub mod data;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use config::HarnessConfig;
pub use error::{Error, Result};
pub use types::*;

/// Conduit E2E version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

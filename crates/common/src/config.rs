//! Harness configuration
//!
//! Every setting comes from the environment with a fallback default, the way
//! the suite has always been driven from `.env` files. A TOML file can supply
//! the same fields. Sources are layered file, then environment, then command
//! line, and only the merged result is validated.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::error::{Error, Result};

pub const ENV_API_URL: &str = "API_URL";
pub const ENV_BASE_URL: &str = "BASE_URL";
pub const ENV_PASSWORD: &str = "PASSWORD";
pub const ENV_REQUEST_TIMEOUT: &str = "E2E_REQUEST_TIMEOUT_SECS";
pub const ENV_RESULTS_DIR: &str = "E2E_RESULTS_DIR";

pub const DEFAULT_API_URL: &str = "http://localhost:8000";
pub const DEFAULT_BASE_URL: &str = "http://localhost:3000";
pub const DEFAULT_PASSWORD_SEED: &str = "password123";

/// Configuration shared by every scenario run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Base URL of the remote Conduit API
    pub api_url: String,

    /// Base URL of the interactive front end
    pub base_url: String,

    /// Seed mixed into generated passwords
    pub password_seed: String,

    /// Per-request timeout for API and session calls
    pub request_timeout_secs: u64,

    /// Where suite reports are written
    pub results_dir: PathBuf,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            password_seed: DEFAULT_PASSWORD_SEED.to_string(),
            request_timeout_secs: 30,
            results_dir: PathBuf::from("test-results"),
        }
    }
}

impl HarnessConfig {
    /// Defaults plus the variables `lookup` knows about, validated
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Self::default().with_overrides(lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file, defaults if the file is missing.
    ///
    /// The result is not validated; later layers may still replace values.
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Ok(toml::from_str(&content)?)
        } else {
            debug!("No config file at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply the variables `lookup` knows about. Blank values are ignored.
    /// Call [`HarnessConfig::validate`] once every layer is applied.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| match lookup(key) {
            Some(value) if value.trim().is_empty() => {
                warn!("{} is set but empty, keeping the current value", key);
                None
            }
            Some(value) => Some(value.trim().to_string()),
            None => None,
        };

        if let Some(url) = read(ENV_API_URL) {
            self.api_url = url;
        }
        if let Some(url) = read(ENV_BASE_URL) {
            self.base_url = url;
        }
        if let Some(seed) = read(ENV_PASSWORD) {
            self.password_seed = seed;
        }
        if let Some(raw) = read(ENV_REQUEST_TIMEOUT) {
            self.request_timeout_secs = raw.parse().map_err(|_| {
                Error::invalid_config(ENV_REQUEST_TIMEOUT, &raw, "expected a whole number of seconds")
            })?;
        }
        if let Some(dir) = read(ENV_RESULTS_DIR) {
            self.results_dir = PathBuf::from(dir);
        }
        Ok(self)
    }

    /// Check that every setting is usable before any scenario starts
    pub fn validate(&self) -> Result<()> {
        validate_http_url("api_url", &self.api_url)?;
        validate_http_url("base_url", &self.base_url)?;

        if self.password_seed.is_empty() {
            return Err(Error::invalid_config("password_seed", "", "must not be empty"));
        }
        if self.request_timeout_secs == 0 {
            return Err(Error::invalid_config(
                "request_timeout_secs",
                "0",
                "must be greater than zero",
            ));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn validate_http_url(key: &str, value: &str) -> Result<()> {
    let url = Url::parse(value).map_err(|e| Error::invalid_config(key, value, e.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(Error::invalid_config(
            key,
            value,
            format!("unsupported scheme '{}'", other),
        )),
    }
}

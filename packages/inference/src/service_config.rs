//! Remote inference service configuration.
//!
//! The defaults live in `services/remote.toml`, embedded at compile time.
//! Two environment variables override them at runtime:
//!
//! - `API_URL` replaces the base URL.
//! - `HOUSING_STRESS_REMOTE_ENABLED=false` disables the remote path, so
//!   sessions start in local mode.

use std::time::Duration;

use serde::Deserialize;

/// Environment variable overriding the service base URL.
pub const ENV_API_URL: &str = "API_URL";

/// Environment variable enabling or disabling the remote path.
pub const ENV_REMOTE_ENABLED: &str = "HOUSING_STRESS_REMOTE_ENABLED";

const REMOTE_TOML: &str = include_str!("../services/remote.toml");

/// Connection settings for the remote inference API.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteServiceConfig {
    /// Unique identifier.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Whether the remote path is attempted at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// API base URL (e.g., `"http://localhost:5000"`).
    pub base_url: String,
    /// Liveness probe timeout.
    #[serde(default = "default_health_timeout")]
    pub health_timeout_secs: u64,
    /// Prediction request timeout.
    #[serde(default = "default_predict_timeout")]
    pub predict_timeout_secs: u64,
}

const fn default_true() -> bool {
    true
}

const fn default_health_timeout() -> u64 {
    5
}

const fn default_predict_timeout() -> u64 {
    10
}

impl RemoteServiceConfig {
    /// The compiled-in configuration, without environment overrides.
    ///
    /// # Panics
    ///
    /// Panics if the embedded TOML is malformed (the file is part of the
    /// crate, so this cannot vary at runtime).
    #[must_use]
    pub fn embedded() -> Self {
        toml::de::from_str(REMOTE_TOML)
            .unwrap_or_else(|e| panic!("Failed to parse remote service config: {e}"))
    }

    /// The compiled-in configuration with environment overrides applied.
    #[must_use]
    pub fn from_env() -> Self {
        Self::embedded().with_overrides(
            std::env::var(ENV_API_URL).ok().as_deref(),
            std::env::var(ENV_REMOTE_ENABLED).ok().as_deref(),
        )
    }

    /// Applies raw override values as read from the environment.
    ///
    /// Empty values are ignored. `enabled` accepts `true`/`false`,
    /// `1`/`0`, `yes`/`no` and `on`/`off`; anything else is ignored with a
    /// warning.
    #[must_use]
    pub fn with_overrides(mut self, base_url: Option<&str>, enabled: Option<&str>) -> Self {
        if let Some(url) = base_url.map(str::trim).filter(|u| !u.is_empty()) {
            self.base_url = url.to_string();
        }
        if let Some(raw) = enabled.map(str::trim).filter(|v| !v.is_empty()) {
            match parse_flag(raw) {
                Some(flag) => self.enabled = flag,
                None => log::warn!("Ignoring {ENV_REMOTE_ENABLED}={raw}: expected true or false"),
            }
        }
        self
    }

    /// Base URL without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// Liveness probe timeout.
    #[must_use]
    pub const fn health_timeout(&self) -> Duration {
        Duration::from_secs(self.health_timeout_secs)
    }

    /// Prediction request timeout.
    #[must_use]
    pub const fn predict_timeout(&self) -> Duration {
        Duration::from_secs(self.predict_timeout_secs)
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

// src/config.rs

//! Probe configuration: timeouts, the reachability retry budget and the
//! third-party endpoints a scan talks to. Every field has a default, so an
//! empty TOML file (or none at all) is a valid configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Prefix for environment overrides, e.g. `VANGUARD_POSTURE_USER_AGENT`.
pub const ENV_PREFIX: &str = "VANGUARD_POSTURE";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub user_agent: String,
    pub reachability: ReachabilityConfig,
    pub timeouts: TimeoutConfig,
    /// Hard ceiling for a whole scan. Probes still running when it passes are cancelled.
    pub scan_deadline_secs: u64,
    pub hsts_preload: HstsPreloadConfig,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            user_agent: String::from("VanguardPosture/0.1"),
            reachability: ReachabilityConfig::default(),
            timeouts: TimeoutConfig::default(),
            scan_deadline_secs: 120,
            hsts_preload: HstsPreloadConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReachabilityConfig {
    pub timeout_secs: u64,
    /// Attempts after the first one.
    pub retries: u32,
    pub retry_delay_ms: u64,
    /// Status codes outside 200..400 that still count as reachable.
    /// Defaults to `[455]`, a non-standard code some targets answer with.
    pub extra_reachable_statuses: Vec<u16>,
}

impl Default for ReachabilityConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            retries: 2,
            retry_delay_ms: 1000,
            extra_reachable_statuses: vec![455],
        }
    }
}

impl ReachabilityConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn is_reachable_status(&self, status: u16) -> bool {
        (200..400).contains(&status) || self.extra_reachable_statuses.contains(&status)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub tls_secs: u64,
    pub headers_secs: u64,
    pub content_secs: u64,
    pub redirect_secs: u64,
    pub hsts_preload_secs: u64,
    /// Per DNS query.
    pub dns_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            tls_secs: 10,
            headers_secs: 15,
            content_secs: 20,
            redirect_secs: 10,
            hsts_preload_secs: 10,
            dns_secs: 5,
        }
    }
}

impl TimeoutConfig {
    pub fn tls(&self) -> Duration {
        Duration::from_secs(self.tls_secs)
    }

    pub fn headers(&self) -> Duration {
        Duration::from_secs(self.headers_secs)
    }

    pub fn content(&self) -> Duration {
        Duration::from_secs(self.content_secs)
    }

    pub fn redirect(&self) -> Duration {
        Duration::from_secs(self.redirect_secs)
    }

    pub fn hsts_preload(&self) -> Duration {
        Duration::from_secs(self.hsts_preload_secs)
    }

    pub fn dns(&self) -> Duration {
        Duration::from_secs(self.dns_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HstsPreloadConfig {
    /// Queried as `<endpoint>?domain=<host>`.
    pub endpoint: String,
}

impl Default for HstsPreloadConfig {
    fn default() -> Self {
        Self {
            endpoint: String::from("https://hstspreload.org/api/v2/status"),
        }
    }
}

impl ProbeConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn scan_deadline(&self) -> Duration {
        Duration::from_secs(self.scan_deadline_secs)
    }

    /// Apply `VANGUARD_POSTURE_*` overrides from the process environment.
    pub fn merge_env(self) -> Self {
        self.merge_vars(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any variable source. Values that fail to parse are ignored.
    pub fn merge_vars(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}_{name}"));

        if let Some(val) = var("USER_AGENT") {
            self.user_agent = val;
        }
        if let Some(n) = var("REACHABILITY_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.reachability.timeout_secs = n;
        }
        if let Some(n) = var("REACHABILITY_RETRIES").and_then(|v| v.parse().ok()) {
            self.reachability.retries = n;
        }
        if let Some(n) = var("REACHABILITY_RETRY_DELAY_MS").and_then(|v| v.parse().ok()) {
            self.reachability.retry_delay_ms = n;
        }
        if let Some(n) = var("SCAN_DEADLINE_SECS").and_then(|v| v.parse().ok()) {
            self.scan_deadline_secs = n;
        }
        if let Some(val) = var("HSTS_PRELOAD_ENDPOINT") {
            self.hsts_preload.endpoint = val;
        }

        self
    }
}

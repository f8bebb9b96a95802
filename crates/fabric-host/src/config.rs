//! Configuration collaborator (spec §6.3): a closed set of recognized
//! tunables read from a TOML document, with change notifications for a
//! watched set of sections. Grounded in `habitat_core`'s choice of `toml`
//! (serde feature) for its own configuration surface.

use std::path::Path;
use std::time::Duration;

use fabric_core::error::{Error, ErrorKind};
use fabric_core::Result;
use fabric_protocol::types::HostedServiceParams;
use serde::Deserialize;

fn default_stop_timeout_secs() -> u64 {
    30
}

fn default_start_timeout_secs() -> u64 {
    30
}

fn default_backoff_interval_secs() -> u64 {
    2
}

fn default_max_retry_interval_secs() -> u64 {
    60
}

fn default_max_failure_count() -> u32 {
    10
}

fn default_reset_interval_secs() -> u64 {
    3600
}

/// Mirrors spec §6.3's closed tunable set exactly; an unrecognized key in
/// the `[host]` table is a `ConfigurationError`, not silently ignored
/// (`#[serde(deny_unknown_fields)]`).
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HostSettings {
    #[serde(default = "default_stop_timeout_secs")]
    pub stop_timeout_secs: u64,
    #[serde(default = "default_start_timeout_secs")]
    pub start_timeout_secs: u64,
    #[serde(default = "default_backoff_interval_secs")]
    pub activation_retry_backoff_interval_secs: u64,
    #[serde(default = "default_max_retry_interval_secs")]
    pub activation_max_retry_interval_secs: u64,
    #[serde(default = "default_max_failure_count")]
    pub activation_max_failure_count: u32,
    #[serde(default = "default_reset_interval_secs")]
    pub hosted_service_continuous_exit_failure_reset_interval_secs: u64,
    #[serde(default)]
    pub enable_restart_management: bool,
    #[serde(default)]
    pub node_disable_wait_secs: u64,
}

impl Default for HostSettings {
    fn default() -> Self {
        HostSettings {
            stop_timeout_secs: default_stop_timeout_secs(),
            start_timeout_secs: default_start_timeout_secs(),
            activation_retry_backoff_interval_secs: default_backoff_interval_secs(),
            activation_max_retry_interval_secs: default_max_retry_interval_secs(),
            activation_max_failure_count: default_max_failure_count(),
            hosted_service_continuous_exit_failure_reset_interval_secs: default_reset_interval_secs(),
            enable_restart_management: false,
            node_disable_wait_secs: 30,
        }
    }
}

impl HostSettings {
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }

    pub fn start_timeout(&self) -> Duration {
        Duration::from_secs(self.start_timeout_secs)
    }

    pub fn node_disable_wait(&self) -> Duration {
        Duration::from_secs(self.node_disable_wait_secs)
    }

    pub fn backoff_config(&self) -> crate::stats::BackoffConfig {
        crate::stats::BackoffConfig {
            backoff_interval: Duration::from_secs(self.activation_retry_backoff_interval_secs),
            max_retry_interval: Duration::from_secs(self.activation_max_retry_interval_secs),
            max_failure_count: self.activation_max_failure_count,
            continuous_exit_failure_reset_interval: Duration::from_secs(
                self.hosted_service_continuous_exit_failure_reset_interval_secs,
            ),
        }
    }
}

/// The whole declared configuration document: host tunables plus the
/// declared-services list (spec §6.3).
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Declaration {
    #[serde(default)]
    pub host: HostSettings,
    #[serde(default)]
    pub services: Vec<HostedServiceParams>,
}

pub fn parse(contents: &str) -> Result<Declaration> {
    toml::from_str(contents)
        .map_err(|e| Error::wrap(ErrorKind::ConfigurationError, "failed to parse configuration", e))
}

pub fn load(path: &Path) -> Result<Declaration> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| Error::wrap(ErrorKind::ConfigurationError, format!("failed to read {}", path.display()), e))?;
    parse(&contents)
}

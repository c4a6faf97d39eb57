//! Aggregated configuration for every subsystem

use std::path::{Path, PathBuf};
use std::time::Duration;

use bulwark_authz::AuthorizationConfig;
use bulwark_containment::{ContainmentConfig, ForensicConfig};
use bulwark_events::EventPipelineConfig;
use bulwark_registry::RegistryConfig;
use bulwark_remediation::RepairConfig;
use bulwark_resilience::CircuitBreakerConfig;
use bulwark_sandbox::SandboxConfig;
use serde::{Deserialize, Serialize};

use crate::error::ControlPlaneResult;

/// Top-level configuration; every section falls back to its defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BulwarkConfig {
    pub registry: RegistryConfig,
    pub events: EventPipelineConfig,
    pub breaker: CircuitBreakerConfig,
    pub authorization: AuthorizationConfig,
    pub containment: ContainmentConfig,
    pub forensics: ForensicConfig,
    pub repair: RepairConfig,
    pub sandbox: SandboxConfig,
    pub monitor: MonitorConfig,
    pub logs: LogConfig,
}

impl BulwarkConfig {
    pub fn from_toml_str(source: &str) -> ControlPlaneResult<Self> {
        Ok(toml::from_str(source)?)
    }

    /// Read and parse a TOML file.
    pub fn load(path: impl AsRef<Path>) -> ControlPlaneResult<Self> {
        let source = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&source)
    }
}

/// Fleet monitor loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub enabled: bool,
    pub interval_ms: u64,
}

impl MonitorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 30_000,
        }
    }
}

/// Where the newline-delimited JSON logs go. Without a directory nothing is
/// persisted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub directory: Option<PathBuf>,
}

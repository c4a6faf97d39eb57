//! Registry configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Registry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Upper bound on a single health probe; a slower probe counts as unhealthy
    pub probe_timeout_ms: u64,
}

impl RegistryConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            probe_timeout_ms: 5_000,
        }
    }
}

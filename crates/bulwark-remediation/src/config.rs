//! Remediation configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Repair configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RepairConfig {
    /// Consecutive failures before a repair is attempted
    pub failure_threshold: u32,

    /// Quiet period after a successful repair
    pub cooldown_ms: u64,

    /// Pause between stopping and starting a component on restart
    pub restart_delay_ms: u64,

    /// Snapshots kept per component by the version store
    pub version_capacity: usize,

    /// Repair attempts kept per component
    pub history_limit: usize,
}

impl RepairConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cooldown_ms: 60_000,
            restart_delay_ms: 100,
            version_capacity: 10,
            history_limit: 50,
        }
    }
}

//! Sandbox configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Sandbox configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Run checks before a change may be promoted
    pub require_validation: bool,

    /// Restore the originating snapshot when validation fails
    pub auto_rollback: bool,

    /// Upper bound on the whole validation phase
    pub validation_timeout_ms: u64,

    /// Fleet error rate above which the system check fails
    pub error_rate_ceiling: f64,

    /// After/before error-rate ratio that counts as degradation
    pub degradation_ratio: f64,

    /// Config changes containing any of these are rejected
    pub forbidden_config_markers: Vec<String>,

    /// Code changes containing any of these are rejected as interface breaks
    pub interface_break_markers: Vec<String>,

    /// Snapshots retained; the oldest is dropped first
    pub max_snapshots: usize,

    /// Change results retained. Promoted and failed changes are dropped
    /// before ones still awaiting promotion.
    pub max_tracked_changes: usize,
}

impl SandboxConfig {
    pub fn validation_timeout(&self) -> Duration {
        Duration::from_millis(self.validation_timeout_ms)
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            require_validation: true,
            auto_rollback: true,
            validation_timeout_ms: 30_000,
            error_rate_ceiling: 0.1,
            degradation_ratio: 1.5,
            forbidden_config_markers: [
                "disable_security",
                "allow_all",
                "skip_auth",
                "rm -rf",
                "drop table",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            interface_break_markers: [
                "breaking change",
                "remove_api",
                "removed_endpoint",
                "unimplemented!",
                "todo!",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            max_snapshots: 64,
            max_tracked_changes: 256,
        }
    }
}

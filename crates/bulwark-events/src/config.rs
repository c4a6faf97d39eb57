//! Event pipeline configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Event pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventPipelineConfig {
    /// Window in which repeated non-critical `(type, source)` events are dropped
    pub debounce_window_ms: u64,
}

impl EventPipelineConfig {
    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_window_ms)
    }
}

impl Default for EventPipelineConfig {
    fn default() -> Self {
        Self {
            debounce_window_ms: 5_000,
        }
    }
}

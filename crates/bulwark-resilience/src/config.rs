//! Circuit breaker configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Circuit breaker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,

    /// Time spent open before a single probe call is admitted.
    pub recovery_timeout_ms: u64,

    /// Hard timeout applied by [`crate::CircuitBreaker::call`].
    pub call_timeout_ms: u64,
}

impl CircuitBreakerConfig {
    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_millis(self.recovery_timeout_ms)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout_ms: 30_000,
            call_timeout_ms: 10_000,
        }
    }
}

//! Registry-owned view of a component

use bulwark_types::{ComponentId, PriorityClass};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Live state of a registered component.
///
/// Handles returned by the registry are copies; mutate through the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentHandle {
    /// Component name
    pub name: ComponentId,

    /// Startup/shutdown class
    pub priority: PriorityClass,

    /// Last known health
    pub healthy: bool,

    /// Failed health checks since the last success
    pub consecutive_failures: u32,

    /// Time of the last health check
    pub last_checked: Option<DateTime<Utc>>,

    /// Error reported by the last failed check
    pub last_error: Option<String>,

    /// Registration time
    pub registered_at: DateTime<Utc>,

    /// Registration order, used to break ties inside a priority class
    pub sequence: u64,

    /// Bumped every time the component is replaced
    pub generation: u32,
}

impl AgentHandle {
    pub(crate) fn new(name: ComponentId, priority: PriorityClass, sequence: u64) -> Self {
        Self {
            name,
            priority,
            healthy: true,
            consecutive_failures: 0,
            last_checked: None,
            last_error: None,
            registered_at: Utc::now(),
            sequence,
            generation: 0,
        }
    }

    /// Startup ordering key: priority class first, then registration order.
    pub fn startup_key(&self) -> (u8, u64) {
        (self.priority.startup_rank(), self.sequence)
    }

    pub(crate) fn record_success(&mut self) {
        self.healthy = true;
        self.consecutive_failures = 0;
        self.last_error = None;
        self.last_checked = Some(Utc::now());
    }

    pub(crate) fn record_failure(&mut self, error: impl Into<String>) {
        self.healthy = false;
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.last_error = Some(error.into());
        self.last_checked = Some(Utc::now());
    }
}

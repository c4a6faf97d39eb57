//! Point-in-time capture of fleet state

use std::collections::BTreeMap;

use bulwark_registry::AgentHandle;
use bulwark_types::{ComponentId, FleetMetrics, SnapshotId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What the fleet looked like before a change was tested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemSnapshot {
    pub id: SnapshotId,
    pub taken_at: DateTime<Utc>,

    /// Registry membership and health
    pub handles: Vec<AgentHandle>,

    /// Current version per component
    pub versions: BTreeMap<ComponentId, u64>,

    /// Monitoring metrics at capture time
    pub metrics: FleetMetrics,
}

impl SystemSnapshot {
    pub fn handle(&self, component: &ComponentId) -> Option<&AgentHandle> {
        self.handles.iter().find(|h| &h.name == component)
    }
}

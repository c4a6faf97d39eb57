//! Versioned snapshot store backing rollback.
//!
//! Per component, snapshots form an append-only sequence with monotonically
//! increasing versions. Once capacity is reached the oldest snapshot is
//! evicted. A separate pointer tracks which version is current; rollback
//! moves the pointer and never rewrites history.

use std::collections::{BTreeMap, VecDeque};

use bulwark_types::{ComponentId, Payload};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{RemediationError, RemediationResult};

/// One recorded state of a component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionSnapshot {
    pub component: ComponentId,
    pub version: u64,

    /// Opaque component state
    pub state: serde_json::Value,

    pub metadata: Payload,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct ComponentVersions {
    snapshots: VecDeque<VersionSnapshot>,
    next_version: u64,
    current: Option<u64>,
}

impl ComponentVersions {
    fn find(&self, version: u64) -> Option<&VersionSnapshot> {
        self.snapshots.iter().find(|s| s.version == version)
    }
}

/// Capacity-bounded snapshot history per component.
pub struct VersionStore {
    capacity: usize,
    entries: DashMap<ComponentId, ComponentVersions>,
}

impl VersionStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: DashMap::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a snapshot and make it current.
    pub fn record(
        &self,
        component: &ComponentId,
        state: serde_json::Value,
        metadata: Payload,
    ) -> VersionSnapshot {
        let mut entry = self.entries.entry(component.clone()).or_default();
        entry.next_version += 1;
        let snapshot = VersionSnapshot {
            component: component.clone(),
            version: entry.next_version,
            state,
            metadata,
            created_at: Utc::now(),
        };
        entry.snapshots.push_back(snapshot.clone());
        while entry.snapshots.len() > self.capacity {
            if let Some(evicted) = entry.snapshots.pop_front() {
                debug!(component = %component, version = evicted.version, "Evicted snapshot");
            }
        }
        entry.current = Some(snapshot.version);
        snapshot
    }

    /// Snapshot the current-version pointer refers to.
    pub fn current(&self, component: &ComponentId) -> Option<VersionSnapshot> {
        let entry = self.entries.get(component)?;
        let current = entry.current?;
        entry.find(current).cloned()
    }

    pub fn current_version(&self, component: &ComponentId) -> Option<u64> {
        self.entries.get(component).and_then(|e| e.current)
    }

    /// Most recently appended snapshot.
    pub fn latest(&self, component: &ComponentId) -> Option<VersionSnapshot> {
        self.entries
            .get(component)
            .and_then(|e| e.snapshots.back().cloned())
    }

    pub fn get(&self, component: &ComponentId, version: u64) -> Option<VersionSnapshot> {
        self.entries
            .get(component)
            .and_then(|e| e.find(version).cloned())
    }

    /// Retained snapshots, oldest first.
    pub fn history(&self, component: &ComponentId) -> Vec<VersionSnapshot> {
        self.entries
            .get(component)
            .map(|e| e.snapshots.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Current version of every component with history.
    pub fn current_versions(&self) -> BTreeMap<ComponentId, u64> {
        self.entries
            .iter()
            .filter_map(|e| e.current.map(|v| (e.key().clone(), v)))
            .collect()
    }

    /// Roll `component` back to `target`, or to the second-most-recent
    /// snapshot when `target` is `None`.
    ///
    /// Fails without changing anything when fewer than two snapshots exist
    /// or the target version is not retained.
    pub fn rollback(
        &self,
        component: &ComponentId,
        target: Option<u64>,
    ) -> RemediationResult<VersionSnapshot> {
        let mut entry = self.entries.get_mut(component).ok_or_else(|| {
            RemediationError::InsufficientHistory {
                component: component.clone(),
                available: 0,
            }
        })?;

        let available = entry.snapshots.len();
        if available < 2 {
            return Err(RemediationError::InsufficientHistory {
                component: component.clone(),
                available,
            });
        }

        let snapshot = match target {
            Some(version) => entry.find(version).cloned().ok_or_else(|| {
                RemediationError::VersionNotFound {
                    component: component.clone(),
                    version,
                }
            })?,
            None => entry.snapshots[available - 2].clone(),
        };

        entry.current = Some(snapshot.version);
        info!(component = %component, version = snapshot.version, "Rolled back");
        Ok(snapshot)
    }

    /// Point `component` at a retained `version`, regardless of how much
    /// history exists.
    pub fn restore_to(
        &self,
        component: &ComponentId,
        version: u64,
    ) -> RemediationResult<VersionSnapshot> {
        let not_found = || RemediationError::VersionNotFound {
            component: component.clone(),
            version,
        };
        let mut entry = self.entries.get_mut(component).ok_or_else(not_found)?;
        let snapshot = entry.find(version).cloned().ok_or_else(not_found)?;
        entry.current = Some(version);
        debug!(component = %component, version, "Restored version pointer");
        Ok(snapshot)
    }
}

impl Default for VersionStore {
    fn default() -> Self {
        Self::new(10)
    }
}

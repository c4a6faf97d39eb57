//! Per-component containment record

use std::collections::BTreeSet;

use bulwark_types::{ComponentId, PriorityClass};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::forensics::{Evidence, ForensicReport};
use crate::level::{ContainmentLevel, Permission, ResourceCaps};

/// Everything the containment system knows about one contained component.
///
/// Created on isolation or quarantine and removed on release.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainmentRecord {
    pub component: ComponentId,
    pub level: ContainmentLevel,
    pub reason: String,
    pub evidence: Evidence,

    /// Peers blocked when the record was last computed
    pub blocked_peers: BTreeSet<ComponentId>,

    pub revoked_permissions: BTreeSet<Permission>,
    pub caps: ResourceCaps,

    /// Latest analysis; release requires it to be safe
    pub forensic_report: Option<ForensicReport>,

    /// Refused release attempts
    pub release_attempts: u32,

    pub contained_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ContainmentRecord {
    pub fn safe_to_release(&self) -> bool {
        self.forensic_report
            .as_ref()
            .map(|r| r.safe_to_release)
            .unwrap_or(false)
    }

    /// Whether traffic to or from `peer` is blocked. `peer_priority` is the
    /// peer's current class, so critical peers registered after isolation
    /// are covered too.
    pub fn blocks(&self, peer: &ComponentId, peer_priority: Option<PriorityClass>) -> bool {
        if peer == &self.component {
            return false;
        }
        self.level.blocks_all_peers()
            || self.blocked_peers.contains(peer)
            || peer_priority == Some(PriorityClass::Critical)
    }

    pub fn permits(&self, permission: Permission) -> bool {
        !self.revoked_permissions.contains(&permission)
    }
}

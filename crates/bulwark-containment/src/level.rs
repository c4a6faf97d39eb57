//! Containment levels and what each one takes away

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// How hard a component is contained, from mildest to strongest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContainmentLevel {
    /// Cut off from critical peers only
    Partial,
    /// Cut off from every peer
    Full,
    /// Cut off from every peer with all permissions revoked
    Emergency,
    /// Emergency plus forensic sign-off before release
    Quarantine,
}

impl ContainmentLevel {
    /// Whether every peer is blocked, not only critical ones.
    pub fn blocks_all_peers(&self) -> bool {
        !matches!(self, ContainmentLevel::Partial)
    }

    /// Whether calls into the component are refused outright.
    pub fn refuses_calls(&self) -> bool {
        !matches!(self, ContainmentLevel::Partial)
    }

    /// Permissions revoked at this level; grows with severity.
    pub fn revoked_permissions(&self) -> BTreeSet<Permission> {
        let mut revoked: BTreeSet<Permission> = [
            Permission::NetworkEgress,
            Permission::ReadSecrets,
            Permission::ModifyCode,
        ]
        .into_iter()
        .collect();

        if *self >= ContainmentLevel::Full {
            revoked.extend([
                Permission::ModifyConfig,
                Permission::PeerMessaging,
                Permission::SpawnProcesses,
                Permission::WriteFiles,
            ]);
        }
        if *self >= ContainmentLevel::Emergency {
            revoked.extend(Permission::ALL);
        }
        revoked
    }
}

impl fmt::Display for ContainmentLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainmentLevel::Partial => write!(f, "partial"),
            ContainmentLevel::Full => write!(f, "full"),
            ContainmentLevel::Emergency => write!(f, "emergency"),
            ContainmentLevel::Quarantine => write!(f, "quarantine"),
        }
    }
}

/// Capability a contained component may lose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    NetworkEgress,
    ReadSecrets,
    ModifyCode,
    ModifyConfig,
    PeerMessaging,
    SpawnProcesses,
    WriteFiles,
    ReadFiles,
    ExecuteActions,
}

impl Permission {
    pub const ALL: [Permission; 9] = [
        Permission::NetworkEgress,
        Permission::ReadSecrets,
        Permission::ModifyCode,
        Permission::ModifyConfig,
        Permission::PeerMessaging,
        Permission::SpawnProcesses,
        Permission::WriteFiles,
        Permission::ReadFiles,
        Permission::ExecuteActions,
    ];
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Permission::NetworkEgress => "network_egress",
            Permission::ReadSecrets => "read_secrets",
            Permission::ModifyCode => "modify_code",
            Permission::ModifyConfig => "modify_config",
            Permission::PeerMessaging => "peer_messaging",
            Permission::SpawnProcesses => "spawn_processes",
            Permission::WriteFiles => "write_files",
            Permission::ReadFiles => "read_files",
            Permission::ExecuteActions => "execute_actions",
        };
        f.write_str(name)
    }
}

/// Resource envelope left to a contained component, as fractions of normal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceCaps {
    pub cpu_fraction: f64,
    pub memory_fraction: f64,
    pub network_fraction: f64,
}

impl ResourceCaps {
    pub fn unrestricted() -> Self {
        Self {
            cpu_fraction: 1.0,
            memory_fraction: 1.0,
            network_fraction: 1.0,
        }
    }

    pub(crate) fn for_level(level: ContainmentLevel, capacity: f64) -> Self {
        Self {
            cpu_fraction: capacity,
            memory_fraction: capacity,
            network_fraction: if level.blocks_all_peers() { 0.0 } else { capacity },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revocations_grow_with_level() {
        let partial = ContainmentLevel::Partial.revoked_permissions();
        let full = ContainmentLevel::Full.revoked_permissions();
        let emergency = ContainmentLevel::Emergency.revoked_permissions();

        assert!(partial.is_subset(&full));
        assert!(full.is_subset(&emergency));
        assert!(!partial.contains(&Permission::ReadFiles));
        assert_eq!(emergency.len(), Permission::ALL.len());
        assert_eq!(
            ContainmentLevel::Quarantine.revoked_permissions(),
            emergency
        );
    }
}

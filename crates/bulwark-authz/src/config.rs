//! Authorization configuration

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::rules::{baseline_rules, emergency_rules, PermissionMode, PermissionRule};

/// Authorization configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthorizationConfig {
    /// Trust reported for an action with no recorded outcomes
    pub initial_trust: f64,

    /// Outcomes retained per action
    pub history_limit: usize,

    /// Baseline permission rules
    pub rules: Vec<PermissionRule>,

    /// Modes applied while the emergency flag is set
    pub emergency: BTreeMap<String, PermissionMode>,
}

impl Default for AuthorizationConfig {
    fn default() -> Self {
        Self {
            initial_trust: 0.5,
            history_limit: 100,
            rules: baseline_rules(),
            emergency: emergency_rules(),
        }
    }
}

//! Permission rules and the built-in rule tables

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{AuthzError, AuthzResult};

/// How an action may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PermissionMode {
    /// Runs without a human once trust is high enough
    Auto,
    /// Needs approval unless trust is high enough
    ApprovalRequired,
    /// Never runs
    Blocked,
}

impl fmt::Display for PermissionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PermissionMode::Auto => write!(f, "auto"),
            PermissionMode::ApprovalRequired => write!(f, "approval_required"),
            PermissionMode::Blocked => write!(f, "blocked"),
        }
    }
}

/// Rule governing one action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionRule {
    /// Action name
    pub action: String,

    /// Base mode
    pub mode: PermissionMode,

    /// Trust needed before the action runs without approval
    pub min_trust: f64,

    /// Whether the emergency flag lifts the approval requirement
    pub emergency_override: bool,
}

impl PermissionRule {
    pub fn new(
        action: impl Into<String>,
        mode: PermissionMode,
        min_trust: f64,
        emergency_override: bool,
    ) -> Self {
        Self {
            action: action.into(),
            mode,
            min_trust,
            emergency_override,
        }
    }

    pub fn auto(action: impl Into<String>, min_trust: f64) -> Self {
        Self::new(action, PermissionMode::Auto, min_trust, false)
    }

    pub fn approval(action: impl Into<String>, min_trust: f64, emergency_override: bool) -> Self {
        Self::new(action, PermissionMode::ApprovalRequired, min_trust, emergency_override)
    }

    pub fn blocked(action: impl Into<String>) -> Self {
        Self::new(action, PermissionMode::Blocked, 1.0, false)
    }

    pub(crate) fn validate(&self) -> AuthzResult<()> {
        if self.action.is_empty() {
            return Err(AuthzError::InvalidRule {
                action: self.action.clone(),
                reason: "empty action name".into(),
            });
        }
        if !(0.0..=1.0).contains(&self.min_trust) {
            return Err(AuthzError::InvalidRule {
                action: self.action.clone(),
                reason: format!("min_trust {} outside [0, 1]", self.min_trust),
            });
        }
        Ok(())
    }
}

/// Built-in rules for the actions the control plane itself takes.
pub fn baseline_rules() -> Vec<PermissionRule> {
    vec![
        PermissionRule::auto("read_logs", 0.0),
        PermissionRule::auto("run_diagnostics", 0.3),
        PermissionRule::auto("restart_component", 0.6),
        PermissionRule::auto("scale_component", 0.7),
        PermissionRule::approval("modify_config", 0.7, true),
        PermissionRule::approval("modify_code", 0.8, false),
        PermissionRule::approval("rollback_change", 0.6, true),
        PermissionRule::approval("deploy_change", 0.9, false),
        PermissionRule::approval("release_quarantine", 0.95, false),
        PermissionRule::blocked("delete_data"),
        PermissionRule::blocked("disable_security"),
    ]
}

/// Actions that may run automatically while the emergency flag is set.
pub fn emergency_rules() -> BTreeMap<String, PermissionMode> {
    [
        ("restart_component", PermissionMode::Auto),
        ("isolate_component", PermissionMode::Auto),
        ("rollback_change", PermissionMode::Auto),
        ("scale_component", PermissionMode::Auto),
        ("deploy_change", PermissionMode::ApprovalRequired),
    ]
    .into_iter()
    .map(|(action, mode)| (action.to_string(), mode))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn baseline_rules_are_valid() {
        for rule in baseline_rules() {
            rule.validate().unwrap();
        }
    }

    #[test]
    fn out_of_range_trust_is_rejected() {
        let rule = PermissionRule::auto("x", 1.5);
        assert!(matches!(rule.validate(), Err(AuthzError::InvalidRule { .. })));
    }
}

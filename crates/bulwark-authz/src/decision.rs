//! Authorization decision types

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::rules::PermissionMode;

/// Why an action was allowed or denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    /// Emergency flag lifted the normal rule
    EmergencyOverride,
    /// No rule exists for the action
    NotDefined,
    /// Rule forbids the action
    Blocked,
    /// Automatic action, trust at or above the threshold
    TrustSufficient,
    /// Automatic action, trust below the threshold
    InsufficientTrust,
    /// Approval-gated action waived by high trust
    HighTrust,
    /// Approval-gated action needs a human
    ApprovalRequired,
}

impl DecisionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionReason::EmergencyOverride => "emergency_override",
            DecisionReason::NotDefined => "not_defined",
            DecisionReason::Blocked => "blocked",
            DecisionReason::TrustSufficient => "trust_sufficient",
            DecisionReason::InsufficientTrust => "insufficient_trust",
            DecisionReason::HighTrust => "high_trust",
            DecisionReason::ApprovalRequired => "approval_required",
        }
    }
}

impl fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of [`crate::AuthorizationEngine::can_execute`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationDecision {
    pub action: String,
    pub allowed: bool,
    pub reason: DecisionReason,

    /// Mode of the rule that decided, if any
    pub mode: Option<PermissionMode>,

    /// Trust value the decision was made with
    pub trust: f64,

    /// Threshold of the deciding rule, if any
    pub min_trust: Option<f64>,

    pub emergency: bool,
}

impl AuthorizationDecision {
    /// `(allowed, reason)` pair.
    pub fn as_pair(&self) -> (bool, &'static str) {
        (self.allowed, self.reason.as_str())
    }

    /// Denied only because a human has not signed off.
    pub fn needs_approval(&self) -> bool {
        !self.allowed && self.reason == DecisionReason::ApprovalRequired
    }
}

//! Proposed changes and their validation outcome

use bulwark_types::{ChangeId, ComponentId, FleetMetrics, SnapshotId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What part of a component a change touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// JSON object merged into the current state
    Config,
    /// Source text replacing the current implementation
    Code,
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeKind::Config => write!(f, "config"),
            ChangeKind::Code => write!(f, "code"),
        }
    }
}

/// A change proposed against one component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SandboxChange {
    pub id: ChangeId,
    pub target: ComponentId,
    pub kind: ChangeKind,
    pub payload: serde_json::Value,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl SandboxChange {
    pub fn new(
        target: impl Into<ComponentId>,
        kind: ChangeKind,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: ChangeId::generate(),
            target: target.into(),
            kind,
            payload,
            description: String::new(),
            created_at: Utc::now(),
        }
    }

    pub fn config(target: impl Into<ComponentId>, payload: serde_json::Value) -> Self {
        Self::new(target, ChangeKind::Config, payload)
    }

    pub fn code(target: impl Into<ComponentId>, source: impl Into<String>) -> Self {
        Self::new(target, ChangeKind::Code, serde_json::Value::String(source.into()))
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Outcome of a single named check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
    pub detail: Option<String>,
}

impl CheckResult {
    pub fn pass(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: true,
            detail: None,
        }
    }

    pub fn fail(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: false,
            detail: Some(detail.into()),
        }
    }
}

/// Result of testing a change in the sandbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeResult {
    pub change_id: ChangeId,
    pub target: ComponentId,
    pub kind: ChangeKind,

    /// Passed validation and showed no degradation
    pub success: bool,
    pub validation_passed: bool,
    pub degradation_detected: bool,
    pub checks: Vec<CheckResult>,

    pub metrics_before: FleetMetrics,
    pub metrics_after: FleetMetrics,

    /// Snapshot the change was tested against
    pub snapshot_id: SnapshotId,
    pub rollback_applied: bool,

    /// State the target would have after promotion
    pub staged_state: serde_json::Value,

    pub error: Option<String>,

    /// Set once promoted to production
    pub applied: bool,
    pub completed_at: DateTime<Utc>,
}

impl ChangeResult {
    pub fn failed_checks(&self) -> impl Iterator<Item = &CheckResult> {
        self.checks.iter().filter(|c| !c.passed)
    }
}

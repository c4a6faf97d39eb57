//! Error types for the control plane

use bulwark_authz::DecisionReason;
use bulwark_types::ComponentId;
use thiserror::Error;

/// Control plane error type
#[derive(Debug, Error)]
pub enum ControlPlaneError {
    /// Authorization denied the action
    #[error("Action '{action}' not authorized: {reason}")]
    NotAuthorized {
        action: String,
        reason: DecisionReason,
    },

    /// Component is contained and refuses calls
    #[error("Component {0} is contained")]
    Contained(ComponentId),

    /// Component is unregistered or reported unhealthy
    #[error("Component {0} is unavailable")]
    Unavailable(ComponentId),

    /// Breaker for the call path is open; the action did not run
    #[error("Circuit open for '{key}'")]
    CircuitOpen { key: String },

    /// The guarded action ran and failed or timed out
    #[error("Action '{action}' failed: {reason}")]
    ActionFailed { action: String, reason: String },

    #[error("Control plane already running")]
    AlreadyRunning,

    #[error("Invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Tracing setup failed: {0}")]
    Telemetry(String),

    #[error("Background task failed: {0}")]
    Task(String),

    #[error("Audit error: {0}")]
    Audit(#[from] bulwark_audit::AuditError),

    #[error("Registry error: {0}")]
    Registry(#[from] bulwark_registry::RegistryError),

    #[error("Event error: {0}")]
    Events(#[from] bulwark_events::EventError),

    #[error("Authorization error: {0}")]
    Authz(#[from] bulwark_authz::AuthzError),

    #[error("Containment error: {0}")]
    Containment(#[from] bulwark_containment::ContainmentError),

    #[error("Remediation error: {0}")]
    Remediation(#[from] bulwark_remediation::RemediationError),

    #[error("Sandbox error: {0}")]
    Sandbox(#[from] bulwark_sandbox::SandboxError),
}

impl ControlPlaneError {
    /// True when the action was refused before it ran.
    pub fn is_refusal(&self) -> bool {
        matches!(
            self,
            ControlPlaneError::NotAuthorized { .. }
                | ControlPlaneError::Contained(_)
                | ControlPlaneError::Unavailable(_)
                | ControlPlaneError::CircuitOpen { .. }
        )
    }
}

/// Result type for control plane operations
pub type ControlPlaneResult<T> = std::result::Result<T, ControlPlaneError>;

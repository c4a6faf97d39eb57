//! Audit error types

use thiserror::Error;

/// Errors raised while writing or reading audit logs
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Audit sink unavailable: {0}")]
    Unavailable(String),
}

/// Result type for audit operations
pub type AuditResult<T> = std::result::Result<T, AuditError>;

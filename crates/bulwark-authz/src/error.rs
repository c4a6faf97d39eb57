//! Authorization error types
//!
//! Denials are not errors; they come back as [`crate::AuthorizationDecision`].

use thiserror::Error;

/// Authorization errors
#[derive(Debug, Error)]
pub enum AuthzError {
    #[error("Invalid rule for '{action}': {reason}")]
    InvalidRule { action: String, reason: String },
}

/// Result type for authorization operations
pub type AuthzResult<T> = std::result::Result<T, AuthzError>;

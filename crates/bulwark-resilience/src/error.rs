//! Breaker error types

use thiserror::Error;

/// Why a guarded call did not produce a value.
///
/// `E` is the wrapped call's own error type.
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    /// Rejected without invoking the call
    #[error("Circuit open for '{key}'")]
    Open { key: String },

    /// The call exceeded its hard timeout
    #[error("Call '{key}' timed out after {timeout_ms}ms")]
    Timeout { key: String, timeout_ms: u64 },

    /// The call itself failed
    #[error("Call failed: {0}")]
    Inner(E),
}

impl<E> BreakerError<E> {
    pub fn is_open(&self) -> bool {
        matches!(self, BreakerError::Open { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, BreakerError::Timeout { .. })
    }

    pub fn into_inner(self) -> Option<E> {
        match self {
            BreakerError::Inner(e) => Some(e),
            _ => None,
        }
    }
}

//! Bulwark Resilience - circuit breakers for privileged call paths
//!
//! One [`CircuitBreaker`] protects one logical call path. Use
//! [`BreakerRegistry`] to get an independent breaker per action key.
//!
//! ```text
//! CLOSED --(failures >= threshold)--> OPEN --(recovery timeout)--> HALF_OPEN
//!   ^                                   ^                              |
//!   +------------(probe succeeds)-------|------------------------------+
//!                                       +-------(probe fails)----------+
//! ```

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod breaker;
pub mod config;
pub mod error;
pub mod registry;

// Re-exports
pub use breaker::{BreakerStats, CircuitBreaker, CircuitState};
pub use config::CircuitBreakerConfig;
pub use error::BreakerError;
pub use registry::BreakerRegistry;

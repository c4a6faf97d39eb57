//! Bulwark Remediation - repairs components that keep failing
//!
//! [`AutoRepair`] counts consecutive failures per component. Once the count
//! reaches the threshold, and the component is outside its post-repair
//! cooldown, it picks a [`RepairStrategy`] and hands it to a
//! [`RepairExecutor`]. A failed attempt escalates the next one up the ladder
//! restart, reset, rollback, isolate, replace.
//!
//! [`VersionStore`] keeps a bounded, append-only history of component state
//! that the rollback strategy and the sandbox restore from.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod config;
pub mod error;
pub mod executor;
pub mod repair;
pub mod strategy;
pub mod versions;

// Re-exports
pub use config::RepairConfig;
pub use error::{RemediationError, RemediationResult};
pub use executor::{Isolator, RegistryRepairExecutor, RepairExecutor};
pub use repair::{AutoRepair, RepairAttempt, RepairOutcome};
pub use strategy::RepairStrategy;
pub use versions::{VersionSnapshot, VersionStore};

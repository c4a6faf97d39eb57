//! Bulwark Containment - isolates suspect components and gates their release
//!
//! - [`ContainmentSystem::isolate`] cuts a component off from its peers at
//!   one of three levels and shrinks its permissions and resource envelope.
//! - [`ContainmentSystem::quarantine`] is the strongest level. It runs the
//!   [`ForensicAnalyzer`] on the supplied evidence straight away.
//! - [`ContainmentSystem::release`] lifts containment only when the attached
//!   [`ForensicReport`] says the component is safe; otherwise it just counts
//!   the attempt.
//!
//! Every isolation and quarantine publishes a CRITICAL event and writes an
//! audit record; a successful release publishes a HIGH event.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod config;
pub mod error;
pub mod forensics;
pub mod level;
pub mod record;
pub mod system;

// Re-exports
pub use config::{ContainmentConfig, ForensicConfig, PatternSpec};
pub use error::{ContainmentError, ContainmentResult};
pub use forensics::{Evidence, ForensicAnalyzer, ForensicReport, Severity, ThreatCategory};
pub use level::{ContainmentLevel, Permission, ResourceCaps};
pub use record::ContainmentRecord;
pub use system::{ContainmentSystem, ReleaseOutcome};

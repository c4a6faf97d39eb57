//! Bulwark Authorization - decides whether an action runs on its own
//!
//! Every privileged action has a [`PermissionRule`]: run automatically, ask
//! for approval, or never run. Automatic runs additionally require the
//! action's empirical trust score to reach the rule's `min_trust`. Trust is
//! the success rate of previously recorded outcomes for that action.
//!
//! Under an emergency flag, actions listed in the emergency table may run
//! automatically regardless of trust.
//!
//! # Example
//!
//! ```
//! use bulwark_authz::{AuthorizationEngine, DecisionReason};
//!
//! let engine = AuthorizationEngine::with_defaults()?;
//! let decision = engine.can_execute("modify_code", false, 0.5);
//! assert!(!decision.allowed);
//! assert_eq!(decision.reason, DecisionReason::ApprovalRequired);
//! # Ok::<(), bulwark_authz::AuthzError>(())
//! ```

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod config;
pub mod decision;
pub mod engine;
pub mod error;
pub mod rules;
pub mod trust;

// Re-exports
pub use config::AuthorizationConfig;
pub use decision::{AuthorizationDecision, DecisionReason};
pub use engine::AuthorizationEngine;
pub use error::{AuthzError, AuthzResult};
pub use rules::{PermissionMode, PermissionRule};
pub use trust::{TrustEntry, TrustRecord};

//! Authorization engine

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bulwark_audit::{AuditRecord, AuditSink, NullAuditSink};
use dashmap::DashMap;
use tracing::{debug, info, instrument, warn};

use crate::config::AuthorizationConfig;
use crate::decision::{AuthorizationDecision, DecisionReason};
use crate::error::AuthzResult;
use crate::rules::{PermissionMode, PermissionRule};
use crate::trust::TrustRecord;

/// Combines static permission rules with per-action trust.
///
/// Decisions are derived fresh on every call from the current rule set and
/// trust value; nothing is cached between calls.
pub struct AuthorizationEngine {
    config: AuthorizationConfig,
    baseline: HashMap<String, PermissionRule>,
    emergency_table: BTreeMap<String, PermissionMode>,
    overrides: DashMap<String, PermissionRule>,
    trust: DashMap<String, TrustRecord>,
    emergency: AtomicBool,
    decision_log: Arc<dyn AuditSink>,
}

impl AuthorizationEngine {
    /// Build an engine from `config`. Any invalid baseline rule rejects the
    /// whole configuration.
    pub fn new(config: AuthorizationConfig, decision_log: Arc<dyn AuditSink>) -> AuthzResult<Self> {
        let mut baseline = HashMap::with_capacity(config.rules.len());
        for rule in &config.rules {
            rule.validate()?;
            baseline.insert(rule.action.clone(), rule.clone());
        }
        let emergency_table = config.emergency.clone();

        Ok(Self {
            config,
            baseline,
            emergency_table,
            overrides: DashMap::new(),
            trust: DashMap::new(),
            emergency: AtomicBool::new(false),
            decision_log,
        })
    }

    /// Engine with the built-in rules and no decision log.
    pub fn with_defaults() -> AuthzResult<Self> {
        Self::new(AuthorizationConfig::default(), Arc::new(NullAuditSink))
    }

    pub fn config(&self) -> &AuthorizationConfig {
        &self.config
    }

    /// Decide whether `action` may run now.
    ///
    /// 1. emergency + emergency table says AUTO: allowed (`emergency_override`)
    /// 2. no rule (override first, then baseline): denied (`not_defined`)
    /// 3. BLOCKED: denied
    /// 4. AUTO: allowed iff `trust >= min_trust`
    /// 5. APPROVAL_REQUIRED: allowed on emergency when the rule permits it, or
    ///    when `trust >= min_trust` (`high_trust`); otherwise `approval_required`
    pub fn can_execute(&self, action: &str, emergency: bool, trust: f64) -> AuthorizationDecision {
        let decide = |allowed, reason, rule: Option<&PermissionRule>| AuthorizationDecision {
            action: action.to_string(),
            allowed,
            reason,
            mode: rule.map(|r| r.mode),
            trust,
            min_trust: rule.map(|r| r.min_trust),
            emergency,
        };

        if emergency && self.emergency_table.get(action) == Some(&PermissionMode::Auto) {
            return AuthorizationDecision {
                mode: Some(PermissionMode::Auto),
                ..decide(true, DecisionReason::EmergencyOverride, None)
            };
        }

        let Some(rule) = self.resolve_rule(action) else {
            return decide(false, DecisionReason::NotDefined, None);
        };

        match rule.mode {
            PermissionMode::Blocked => decide(false, DecisionReason::Blocked, Some(&rule)),
            PermissionMode::Auto if trust >= rule.min_trust => {
                decide(true, DecisionReason::TrustSufficient, Some(&rule))
            }
            PermissionMode::Auto => decide(false, DecisionReason::InsufficientTrust, Some(&rule)),
            PermissionMode::ApprovalRequired if emergency && rule.emergency_override => {
                decide(true, DecisionReason::EmergencyOverride, Some(&rule))
            }
            PermissionMode::ApprovalRequired if trust >= rule.min_trust => {
                decide(true, DecisionReason::HighTrust, Some(&rule))
            }
            PermissionMode::ApprovalRequired => {
                decide(false, DecisionReason::ApprovalRequired, Some(&rule))
            }
        }
    }

    /// Decide using the recorded trust and the engine's emergency flag, and
    /// append the decision to the decision log.
    #[instrument(skip(self))]
    pub async fn authorize(&self, action: &str) -> AuthorizationDecision {
        let decision = self.can_execute(action, self.is_emergency(), self.trust_score(action));

        debug!(
            action = %action,
            allowed = decision.allowed,
            reason = %decision.reason,
            trust = decision.trust,
            "Authorization decided"
        );

        let record = AuditRecord::new("decision")
            .field("action", action)
            .field("allowed", decision.allowed)
            .field("reason", decision.reason)
            .field("mode", decision.mode)
            .field("trust", decision.trust)
            .field("min_trust", decision.min_trust)
            .field("emergency", decision.emergency);
        if let Err(e) = self.decision_log.append(record).await {
            warn!(action = %action, error = %e, "Failed to write decision log");
        }

        decision
    }

    /// The rule currently governing `action`; overrides win over baseline.
    pub fn resolve_rule(&self, action: &str) -> Option<PermissionRule> {
        self.overrides
            .get(action)
            .map(|r| r.clone())
            .or_else(|| self.baseline.get(action).cloned())
    }

    /// Install or replace an override rule.
    pub fn set_override(&self, rule: PermissionRule) -> AuthzResult<()> {
        rule.validate()?;
        info!(
            action = %rule.action,
            mode = %rule.mode,
            min_trust = rule.min_trust,
            "Permission override set"
        );
        self.overrides.insert(rule.action.clone(), rule);
        Ok(())
    }

    /// Remove an override, falling back to the baseline rule.
    pub fn clear_override(&self, action: &str) -> Option<PermissionRule> {
        let removed = self.overrides.remove(action).map(|(_, rule)| rule);
        if removed.is_some() {
            info!(action = %action, "Permission override cleared");
        }
        removed
    }

    /// Record the outcome of an executed action and return the new trust.
    pub fn record_decision(&self, action: &str, success: bool) -> f64 {
        let mut record = self
            .trust
            .entry(action.to_string())
            .or_insert_with(|| TrustRecord::new(action, self.config.initial_trust));
        let trust = record.record(success, self.config.history_limit);
        debug!(action = %action, success, trust, "Trust updated");
        trust
    }

    /// Current trust for `action`; the configured initial trust if nothing
    /// has been recorded.
    pub fn trust_score(&self, action: &str) -> f64 {
        self.trust
            .get(action)
            .map(|r| r.trust)
            .unwrap_or_else(|| self.config.initial_trust.clamp(0.0, 1.0))
    }

    pub fn trust_record(&self, action: &str) -> Option<TrustRecord> {
        self.trust.get(action).map(|r| r.clone())
    }

    pub fn set_emergency(&self, emergency: bool) {
        let previous = self.emergency.swap(emergency, Ordering::SeqCst);
        if previous != emergency {
            warn!(emergency, "Emergency mode changed");
        }
    }

    pub fn is_emergency(&self) -> bool {
        self.emergency.load(Ordering::SeqCst)
    }
}

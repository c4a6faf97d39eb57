//! Per-action trust records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// One recorded outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustEntry {
    pub success: bool,
    pub trust_after: f64,
    pub recorded_at: DateTime<Utc>,
}

/// Running success rate for one action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustRecord {
    pub action: String,
    pub successes: u64,
    pub failures: u64,

    /// `successes / (successes + failures)`, always within `[0, 1]`
    pub trust: f64,

    /// Most recent outcomes, oldest first
    pub history: VecDeque<TrustEntry>,

    pub updated_at: DateTime<Utc>,
}

impl TrustRecord {
    pub(crate) fn new(action: impl Into<String>, initial_trust: f64) -> Self {
        Self {
            action: action.into(),
            successes: 0,
            failures: 0,
            trust: initial_trust.clamp(0.0, 1.0),
            history: VecDeque::new(),
            updated_at: Utc::now(),
        }
    }

    pub fn total(&self) -> u64 {
        self.successes + self.failures
    }

    pub(crate) fn record(&mut self, success: bool, history_limit: usize) -> f64 {
        if success {
            self.successes = self.successes.saturating_add(1);
        } else {
            self.failures = self.failures.saturating_add(1);
        }

        let total = self.total();
        if total > 0 {
            self.trust = (self.successes as f64 / total as f64).clamp(0.0, 1.0);
        }
        self.updated_at = Utc::now();

        self.history.push_back(TrustEntry {
            success,
            trust_after: self.trust,
            recorded_at: self.updated_at,
        });
        while self.history.len() > history_limit {
            self.history.pop_front();
        }

        self.trust
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trust_is_success_rate() {
        let mut record = TrustRecord::new("modify_code", 0.5);
        for _ in 0..8 {
            record.record(true, 100);
        }
        for _ in 0..2 {
            record.record(false, 100);
        }
        assert!((record.trust - 0.8).abs() < 1e-9);
        assert_eq!(record.total(), 10);
    }

    #[test]
    fn history_is_bounded() {
        let mut record = TrustRecord::new("x", 0.5);
        for i in 0..10 {
            record.record(i % 2 == 0, 4);
        }
        assert_eq!(record.history.len(), 4);
        assert_eq!(record.total(), 10);
    }
}

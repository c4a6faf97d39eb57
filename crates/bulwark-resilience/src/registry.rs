//! One breaker per action key

use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::breaker::{BreakerStats, CircuitBreaker};
use crate::config::CircuitBreakerConfig;

/// Lazily creates and hands out independent breakers, one per key.
pub struct BreakerRegistry {
    config: CircuitBreakerConfig,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl BreakerRegistry {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            breakers: DashMap::new(),
        }
    }

    /// The breaker for `key`, created on first use.
    pub fn breaker(&self, key: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(key) {
            return Arc::clone(existing.value());
        }
        let breaker = self
            .breakers
            .entry(key.to_string())
            .or_insert_with(|| {
                debug!(key = %key, "Creating circuit breaker");
                Arc::new(CircuitBreaker::new(key, self.config.clone()))
            });
        Arc::clone(breaker.value())
    }

    /// The breaker for `key`, if one was ever created.
    pub fn get(&self, key: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(key).map(|b| Arc::clone(b.value()))
    }

    pub fn reset(&self, key: &str) -> bool {
        match self.breakers.get(key) {
            Some(breaker) => {
                breaker.reset();
                true
            }
            None => false,
        }
    }

    /// Stats for every breaker, sorted by key.
    pub fn stats(&self) -> Vec<BreakerStats> {
        let mut stats: Vec<BreakerStats> = self.breakers.iter().map(|b| b.stats()).collect();
        stats.sort_by(|a, b| a.key.cmp(&b.key));
        stats
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}

impl Default for BreakerRegistry {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::CircuitState;

    #[test]
    fn same_key_returns_same_breaker() {
        let registry = BreakerRegistry::default();
        let a = registry.breaker("deploy");
        let b = registry.breaker("deploy");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn keys_are_isolated() {
        let registry = BreakerRegistry::new(CircuitBreakerConfig {
            failure_threshold: 1,
            ..Default::default()
        });
        registry.breaker("modify_code").record_failure();

        assert_eq!(registry.breaker("modify_code").state(), CircuitState::Open);
        assert_eq!(registry.breaker("read_logs").state(), CircuitState::Closed);

        let stats = registry.stats();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].key, "modify_code");
        assert_eq!(stats[0].times_opened, 1);

        assert!(registry.reset("modify_code"));
        assert!(!registry.reset("unknown"));
        assert_eq!(registry.breaker("modify_code").state(), CircuitState::Closed);
    }
}

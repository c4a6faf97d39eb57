//! Circuit breaker pattern for privileged calls.
//!
//! Stops a failing call path from being hammered: after enough consecutive
//! failures the breaker rejects calls outright, then admits a single probe
//! once the recovery timeout has passed.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::CircuitBreakerConfig;
use crate::error::BreakerError;

/// State of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Calls flow normally.
    Closed,

    /// Calls are rejected.
    Open,

    /// One probe call decides whether to close or re-open.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
    last_failure: Option<DateTime<Utc>>,
    last_success: Option<DateTime<Utc>>,
    last_transition: DateTime<Utc>,
    times_opened: u64,
    rejected: u64,
}

/// Admission ticket for one call. Dropping an unsettled probe ticket (the
/// caller was cancelled) frees the half-open slot for the next caller.
struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    probe: bool,
    settled: bool,
}

impl Permit<'_> {
    fn settle(mut self, success: bool) {
        self.settled = true;
        if success {
            self.breaker.record_success();
        } else {
            self.breaker.record_failure();
        }
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if self.probe && !self.settled {
            let mut inner = self.breaker.inner.lock();
            inner.probe_in_flight = false;
            debug!(key = %self.breaker.key, "Abandoned half-open probe");
        }
    }
}

/// Circuit breaker for one logical call path.
pub struct CircuitBreaker {
    key: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(key: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            key: key.into(),
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failure_count: 0,
                opened_at: None,
                probe_in_flight: false,
                last_failure: None,
                last_success: None,
                last_transition: Utc::now(),
                times_opened: 0,
                rejected: 0,
            }),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Current state. An open breaker whose recovery timeout has passed
    /// reports `HalfOpen`.
    pub fn state(&self) -> CircuitState {
        let mut inner = self.inner.lock();
        self.check_timeout(&mut inner);
        inner.state
    }

    /// Whether a call issued now would be admitted.
    pub fn is_available(&self) -> bool {
        let mut inner = self.inner.lock();
        self.check_timeout(&mut inner);
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => false,
            CircuitState::HalfOpen => !inner.probe_in_flight,
        }
    }

    /// Run `f` under the configured call timeout.
    pub async fn call<F, Fut, T, E>(&self, f: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.guard(f, self.config.call_timeout()).await
    }

    /// Run `f` through the breaker with a hard `timeout`.
    ///
    /// Returns [`BreakerError::Open`] without invoking `f` while the breaker
    /// is open, or while a half-open probe is already running. A timeout or
    /// an `Err` counts as a failure; `Ok` counts as a success.
    pub async fn guard<F, Fut, T, E>(&self, f: F, timeout: Duration) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let permit = self.admit().ok_or_else(|| BreakerError::Open {
            key: self.key.clone(),
        })?;

        match tokio::time::timeout(timeout, f()).await {
            Ok(Ok(value)) => {
                permit.settle(true);
                Ok(value)
            }
            Ok(Err(e)) => {
                permit.settle(false);
                Err(BreakerError::Inner(e))
            }
            Err(_) => {
                permit.settle(false);
                warn!(key = %self.key, timeout_ms = timeout.as_millis() as u64, "Guarded call timed out");
                Err(BreakerError::Timeout {
                    key: self.key.clone(),
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Record a successful call made outside [`guard`](Self::guard).
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        inner.last_success = Some(Utc::now());
        match inner.state {
            CircuitState::Closed => {
                inner.failure_count = 0;
            }
            CircuitState::HalfOpen => {
                info!(key = %self.key, "Circuit breaker closing after successful probe");
                self.transition_to(&mut inner, CircuitState::Closed);
            }
            CircuitState::Open => {
                debug!(key = %self.key, "Success recorded while circuit open");
            }
        }
    }

    /// Record a failed call made outside [`guard`](Self::guard).
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.last_failure = Some(Utc::now());
        match inner.state {
            CircuitState::Closed => {
                inner.failure_count = inner.failure_count.saturating_add(1);
                if inner.failure_count >= self.config.failure_threshold {
                    warn!(
                        key = %self.key,
                        failures = inner.failure_count,
                        "Circuit breaker opening due to failures"
                    );
                    self.transition_to(&mut inner, CircuitState::Open);
                }
            }
            CircuitState::HalfOpen => {
                warn!(key = %self.key, "Circuit breaker re-opening after failed probe");
                self.transition_to(&mut inner, CircuitState::Open);
            }
            CircuitState::Open => {}
        }
    }

    /// Force the breaker closed and clear its counters.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        info!(key = %self.key, old_state = %inner.state, "Circuit breaker reset");
        self.transition_to(&mut inner, CircuitState::Closed);
    }

    pub fn stats(&self) -> BreakerStats {
        let mut inner = self.inner.lock();
        self.check_timeout(&mut inner);
        BreakerStats {
            key: self.key.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            times_opened: inner.times_opened,
            rejected: inner.rejected,
            last_failure: inner.last_failure,
            last_success: inner.last_success,
            last_transition: inner.last_transition,
        }
    }

    fn admit(&self) -> Option<Permit<'_>> {
        let mut inner = self.inner.lock();
        self.check_timeout(&mut inner);
        let probe = match inner.state {
            CircuitState::Closed => false,
            CircuitState::HalfOpen if !inner.probe_in_flight => {
                inner.probe_in_flight = true;
                true
            }
            CircuitState::HalfOpen | CircuitState::Open => {
                inner.rejected += 1;
                debug!(key = %self.key, state = %inner.state, "Call rejected by open circuit");
                return None;
            }
        };
        Some(Permit {
            breaker: self,
            probe,
            settled: false,
        })
    }

    /// Move from open to half-open once the recovery timeout has elapsed.
    fn check_timeout(&self, inner: &mut BreakerInner) {
        if inner.state != CircuitState::Open {
            return;
        }
        let Some(opened_at) = inner.opened_at else {
            return;
        };
        if opened_at.elapsed() >= self.config.recovery_timeout() {
            info!(key = %self.key, "Circuit breaker transitioning to half-open after timeout");
            self.transition_to(inner, CircuitState::HalfOpen);
        }
    }

    fn transition_to(&self, inner: &mut BreakerInner, new_state: CircuitState) {
        inner.state = new_state;
        inner.last_transition = Utc::now();
        inner.probe_in_flight = false;

        match new_state {
            CircuitState::Closed => {
                inner.failure_count = 0;
                inner.opened_at = None;
            }
            CircuitState::Open => {
                inner.opened_at = Some(Instant::now());
                inner.times_opened += 1;
            }
            CircuitState::HalfOpen => {}
        }
    }
}

/// Point-in-time view of a breaker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakerStats {
    /// Call path this breaker protects.
    pub key: String,

    /// Current state.
    pub state: CircuitState,

    /// Consecutive failures while closed.
    pub failure_count: u32,

    /// How many times the breaker has opened.
    pub times_opened: u64,

    /// Calls rejected without being invoked.
    pub rejected: u64,

    pub last_failure: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,

    /// Time of last state transition.
    pub last_transition: DateTime<Utc>,
}

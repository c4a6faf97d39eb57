//! Failure detection and graduated self-repair.

use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use bulwark_audit::{AuditRecord, AuditSink};
use bulwark_events::EventPipeline;
use bulwark_registry::ComponentRegistry;
use bulwark_types::{event_types, ComponentId, Event, EventPriority};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::config::RepairConfig;
use crate::error::{RemediationError, RemediationResult};
use crate::executor::RepairExecutor;
use crate::strategy::RepairStrategy;

/// One executed repair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepairAttempt {
    pub component: ComponentId,
    pub strategy: RepairStrategy,
    pub success: bool,

    /// Failure that triggered the repair
    pub trigger: String,

    /// Why the repair itself failed
    pub error: Option<String>,

    pub attempted_at: DateTime<Utc>,
}

/// What [`AutoRepair::detect_and_repair`] did.
#[derive(Debug, Clone, PartialEq)]
pub enum RepairOutcome {
    /// Failure counted; threshold not reached yet
    BelowThreshold { failures: u32, threshold: u32 },
    /// Threshold reached but the component was repaired recently
    CoolingDown { failures: u32, remaining: Duration },
    /// Threshold reached while another repair of the component is running
    InProgress { failures: u32 },
    /// Repair ran and succeeded; counter and cooldown reset
    Repaired(RepairAttempt),
    /// Repair ran and failed; the next attempt escalates
    Failed(RepairAttempt),
}

impl RepairOutcome {
    pub fn attempt(&self) -> Option<&RepairAttempt> {
        match self {
            RepairOutcome::Repaired(a) | RepairOutcome::Failed(a) => Some(a),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct RepairState {
    consecutive_failures: u32,
    last_success: Option<Instant>,
    last_attempt: Option<RepairAttempt>,
    history: VecDeque<RepairAttempt>,
    in_progress: bool,
}

/// Clears the in-progress flag when the repair finishes or is cancelled.
struct InFlight<'a> {
    states: &'a DashMap<ComponentId, RepairState>,
    component: &'a ComponentId,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if let Some(mut state) = self.states.get_mut(self.component) {
            state.in_progress = false;
        }
    }
}

/// Detects repeated component failure and runs graduated repairs.
pub struct AutoRepair {
    config: RepairConfig,
    registry: Arc<ComponentRegistry>,
    executor: Arc<dyn RepairExecutor>,
    events: Arc<EventPipeline>,
    repair_log: Arc<dyn AuditSink>,
    states: DashMap<ComponentId, RepairState>,
}

impl AutoRepair {
    pub fn new(
        config: RepairConfig,
        registry: Arc<ComponentRegistry>,
        executor: Arc<dyn RepairExecutor>,
        events: Arc<EventPipeline>,
        repair_log: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            config,
            registry,
            executor,
            events,
            repair_log,
            states: DashMap::new(),
        }
    }

    pub fn config(&self) -> &RepairConfig {
        &self.config
    }

    /// Count a failure of `component` and repair it once the threshold is
    /// reached.
    ///
    /// Repair errors and panics are contained and reported as
    /// [`RepairOutcome::Failed`]. Only an unregistered component is an error.
    #[instrument(skip(self, component, error), fields(component = %component))]
    pub async fn detect_and_repair(
        &self,
        component: &ComponentId,
        error: &str,
    ) -> RemediationResult<RepairOutcome> {
        let priority = self
            .registry
            .priority_of(component.as_str())
            .ok_or_else(|| RemediationError::ComponentNotFound(component.clone()))?;

        let strategy = {
            let mut state = self.states.entry(component.clone()).or_default();
            state.consecutive_failures = state.consecutive_failures.saturating_add(1);
            let failures = state.consecutive_failures;

            if failures < self.config.failure_threshold {
                debug!(failures, "Failure recorded, below repair threshold");
                return Ok(RepairOutcome::BelowThreshold {
                    failures,
                    threshold: self.config.failure_threshold,
                });
            }

            if state.in_progress {
                debug!(failures, "Repair already running");
                return Ok(RepairOutcome::InProgress { failures });
            }

            if let Some(last) = state.last_success {
                let elapsed = last.elapsed();
                if elapsed < self.config.cooldown() {
                    let remaining = self.config.cooldown() - elapsed;
                    debug!(failures, remaining_ms = remaining.as_millis() as u64, "Repair cooling down");
                    return Ok(RepairOutcome::CoolingDown {
                        failures,
                        remaining,
                    });
                }
            }

            state.in_progress = true;
            match &state.last_attempt {
                Some(previous) if !previous.success => previous.strategy.escalate(),
                _ => RepairStrategy::select(priority, component.as_str(), error),
            }
        };
        let _in_flight = InFlight {
            states: &self.states,
            component,
        };

        info!(strategy = %strategy, trigger = %error, "Attempting repair");
        let result = AssertUnwindSafe(self.executor.execute(component, strategy))
            .catch_unwind()
            .await;
        let failure = match result {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(_) => Some("repair executor panicked".to_string()),
        };

        let attempt = RepairAttempt {
            component: component.clone(),
            strategy,
            success: failure.is_none(),
            trigger: error.to_string(),
            error: failure,
            attempted_at: Utc::now(),
        };

        {
            let mut state = self.states.entry(component.clone()).or_default();
            if attempt.success {
                state.consecutive_failures = 0;
                state.last_success = Some(Instant::now());
            }
            state.last_attempt = Some(attempt.clone());
            state.history.push_back(attempt.clone());
            while state.history.len() > self.config.history_limit {
                state.history.pop_front();
            }
        }

        self.report(&attempt).await;

        if attempt.success {
            info!(strategy = %strategy, "Repair succeeded");
            Ok(RepairOutcome::Repaired(attempt))
        } else {
            warn!(
                strategy = %strategy,
                error = attempt.error.as_deref().unwrap_or_default(),
                "Repair failed"
            );
            Ok(RepairOutcome::Failed(attempt))
        }
    }

    /// Consecutive failures counted for `component` since its last repair.
    pub fn failure_count(&self, component: &ComponentId) -> u32 {
        self.states
            .get(component)
            .map(|s| s.consecutive_failures)
            .unwrap_or(0)
    }

    /// Repair attempts for `component`, oldest first.
    pub fn history(&self, component: &ComponentId) -> Vec<RepairAttempt> {
        self.states
            .get(component)
            .map(|s| s.history.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Forget counters and history for `component`.
    pub fn clear(&self, component: &ComponentId) {
        self.states.remove(component);
    }

    async fn report(&self, attempt: &RepairAttempt) {
        let record = AuditRecord::new("repair")
            .field("component", &attempt.component)
            .field("strategy", attempt.strategy)
            .field("success", attempt.success)
            .field("trigger", &attempt.trigger)
            .field("error", &attempt.error);
        if let Err(e) = self.repair_log.append(record).await {
            warn!(component = %attempt.component, error = %e, "Failed to write repair log");
        }

        let (event_type, priority) = if attempt.success {
            (event_types::REPAIR_COMPLETED, EventPriority::Medium)
        } else {
            (event_types::REPAIR_FAILED, EventPriority::High)
        };
        let event = Event::new(event_type, attempt.component.clone(), priority)
            .with_field("strategy", attempt.strategy)
            .with_field("trigger", &attempt.trigger)
            .with_field("error", &attempt.error);
        self.events.publish(event).await;
    }
}

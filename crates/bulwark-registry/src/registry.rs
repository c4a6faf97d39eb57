//! In-memory component registry.
//!
//! The registry is the single writer of [`AgentHandle`]s. Health cycles probe
//! a per-cycle copy of the capability table, so a slow probe never holds a
//! map shard lock, and then write the results back.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bulwark_types::{ComponentId, FleetMetrics, PriorityClass};
use dashmap::DashMap;
use futures::future::join_all;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::capability::{Capabilities, HealthCapability, HealthProbe, Lifecycle};
use crate::config::RegistryConfig;
use crate::error::{RegistryError, RegistryResult};
use crate::handle::AgentHandle;

struct RegistryEntry {
    handle: AgentHandle,
    capabilities: Capabilities,
}

/// Outcome of [`ComponentRegistry::shutdown_all`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShutdownReport {
    /// Components in the order they were stopped
    pub stopped: Vec<ComponentId>,

    /// Components whose teardown failed, with the error
    pub failed: Vec<(ComponentId, String)>,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Tracks every registered component, its priority class and live health.
pub struct ComponentRegistry {
    config: RegistryConfig,
    entries: DashMap<ComponentId, RegistryEntry>,
    sequence: AtomicU64,
}

impl ComponentRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            config,
            entries: DashMap::new(),
            sequence: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Register a component without capabilities.
    ///
    /// Idempotent: registering an existing name returns the current handle
    /// unchanged.
    pub fn register(&self, name: impl Into<ComponentId>, priority: PriorityClass) -> AgentHandle {
        self.register_with(name, priority, Capabilities::none())
    }

    /// Register a component together with its adapter capabilities.
    ///
    /// Re-registering keeps the existing handle (health, counters and
    /// priority) and only attaches the new capabilities.
    pub fn register_with(
        &self,
        name: impl Into<ComponentId>,
        priority: PriorityClass,
        capabilities: Capabilities,
    ) -> AgentHandle {
        let name = name.into();

        let mut entry = self.entries.entry(name.clone()).or_insert_with(|| {
            let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
            info!(component = %name, priority = %priority, "Registering component");
            RegistryEntry {
                handle: AgentHandle::new(name.clone(), priority, seq),
                capabilities: Capabilities::none(),
            }
        });

        if matches!(capabilities.health, HealthCapability::Probed(_))
            || capabilities.lifecycle.is_some()
        {
            entry.capabilities = capabilities;
        }

        entry.handle.clone()
    }

    /// Attach (or swap) a health probe for a registered component.
    pub fn attach_probe(&self, name: &str, probe: Arc<dyn HealthProbe>) -> RegistryResult<()> {
        let mut entry = self.entry_mut(name)?;
        entry.capabilities.health = HealthCapability::Probed(probe);
        Ok(())
    }

    /// Attach (or swap) a lifecycle capability for a registered component.
    pub fn attach_lifecycle(&self, name: &str, lifecycle: Arc<dyn Lifecycle>) -> RegistryResult<()> {
        let mut entry = self.entry_mut(name)?;
        entry.capabilities.lifecycle = Some(lifecycle);
        Ok(())
    }

    /// Remove a component entirely.
    pub fn unregister(&self, name: &str) -> Option<AgentHandle> {
        self.entries.remove(name).map(|(_, entry)| {
            info!(component = %name, "Unregistered component");
            entry.handle
        })
    }

    /// Handle for a component, only if it is currently healthy.
    pub fn get(&self, name: &str) -> Option<AgentHandle> {
        self.entries
            .get(name)
            .filter(|entry| entry.handle.healthy)
            .map(|entry| entry.handle.clone())
    }

    /// Handle for a component regardless of health.
    pub fn handle(&self, name: &str) -> Option<AgentHandle> {
        self.entries.get(name).map(|entry| entry.handle.clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn priority_of(&self, name: &str) -> Option<PriorityClass> {
        self.entries.get(name).map(|entry| entry.handle.priority)
    }

    /// Copies of every handle, in startup order.
    pub fn members(&self) -> Vec<AgentHandle> {
        let mut handles: Vec<AgentHandle> = self
            .entries
            .iter()
            .map(|entry| entry.handle.clone())
            .collect();
        handles.sort_by_key(|h| h.startup_key());
        handles
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn mark_healthy(&self, name: &str) -> RegistryResult<()> {
        let mut entry = self.entry_mut(name)?;
        entry.handle.record_success();
        debug!(component = %name, "Marked healthy");
        Ok(())
    }

    pub fn mark_unhealthy(&self, name: &str, error: impl Into<String>) -> RegistryResult<()> {
        let error = error.into();
        let mut entry = self.entry_mut(name)?;
        entry.handle.record_failure(error.clone());
        debug!(component = %name, error = %error, "Marked unhealthy");
        Ok(())
    }

    /// Clear failure counters and the last error; the component becomes healthy.
    pub fn reset(&self, name: &str) -> RegistryResult<()> {
        let mut entry = self.entry_mut(name)?;
        entry.handle.record_success();
        info!(component = %name, "Reset component state");
        Ok(())
    }

    /// Swap in a fresh handle with the same priority and capabilities.
    pub fn replace(&self, name: &str) -> RegistryResult<AgentHandle> {
        let mut entry = self.entry_mut(name)?;
        let seq = entry.handle.sequence;
        let generation = entry.handle.generation.saturating_add(1);
        let mut fresh = AgentHandle::new(entry.handle.name.clone(), entry.handle.priority, seq);
        fresh.generation = generation;
        entry.handle = fresh.clone();
        info!(component = %name, generation, "Replaced component");
        Ok(fresh)
    }

    /// Overwrite health state from a previously captured handle.
    ///
    /// Used to restore a snapshot; unknown components are ignored.
    pub fn restore(&self, saved: &AgentHandle) {
        if let Some(mut entry) = self.entries.get_mut(&saved.name) {
            entry.handle.healthy = saved.healthy;
            entry.handle.consecutive_failures = saved.consecutive_failures;
            entry.handle.last_error = saved.last_error.clone();
            entry.handle.last_checked = saved.last_checked;
        }
    }

    /// Total, healthy and error-rate counts over current membership.
    pub fn fleet_metrics(&self) -> FleetMetrics {
        let total = self.entries.len();
        let healthy = self.entries.iter().filter(|e| e.handle.healthy).count();
        FleetMetrics::from_counts(total, healthy)
    }

    /// Probe every component and record the results.
    ///
    /// Components without a probe count as healthy. A probe that errors,
    /// panics or exceeds the probe timeout counts as unhealthy; nothing is
    /// raised to the caller.
    #[instrument(skip(self))]
    pub async fn health_check_all(&self) -> HashMap<ComponentId, bool> {
        let cycle: Vec<(ComponentId, HealthCapability)> = self
            .entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.capabilities.health.clone()))
            .collect();

        let timeout = self.config.probe_timeout();
        let timeout_ms = self.config.probe_timeout_ms;

        let checks = cycle.into_iter().map(|(name, capability)| async move {
            let verdict: Result<bool, String> = match capability {
                HealthCapability::Unprobed => Ok(true),
                HealthCapability::Probed(probe) => {
                    let call = AssertUnwindSafe(probe.check_health()).catch_unwind();
                    match tokio::time::timeout(timeout, call).await {
                        Ok(Ok(Ok(healthy))) => Ok(healthy),
                        Ok(Ok(Err(e))) => Err(e.to_string()),
                        Ok(Err(_)) => Err("probe panicked".to_string()),
                        Err(_) => Err(RegistryError::ProbeTimeout { timeout_ms }.to_string()),
                    }
                }
            };
            (name, verdict)
        });

        let verdicts = join_all(checks).await;

        let mut results = HashMap::with_capacity(verdicts.len());
        for (name, verdict) in verdicts {
            // The component may have been unregistered mid-cycle.
            let Some(mut entry) = self.entries.get_mut(&name) else {
                continue;
            };
            let healthy = match verdict {
                Ok(true) => {
                    entry.handle.record_success();
                    true
                }
                Ok(false) => {
                    entry.handle.record_failure("probe reported unhealthy");
                    false
                }
                Err(error) => {
                    warn!(component = %name, error = %error, "Health probe failed");
                    entry.handle.record_failure(error);
                    false
                }
            };
            drop(entry);
            results.insert(name, healthy);
        }

        debug!(
            checked = results.len(),
            unhealthy = results.values().filter(|h| !**h).count(),
            "Health cycle complete"
        );
        results
    }

    /// Stop every component in reverse startup order.
    ///
    /// A failing teardown is logged and recorded in the report; the remaining
    /// components are still stopped.
    #[instrument(skip(self))]
    pub async fn shutdown_all(&self) -> ShutdownReport {
        let mut order: Vec<(AgentHandle, Option<Arc<dyn Lifecycle>>)> = self
            .entries
            .iter()
            .map(|entry| (entry.handle.clone(), entry.capabilities.lifecycle.clone()))
            .collect();
        order.sort_by_key(|(handle, _)| std::cmp::Reverse(handle.startup_key()));

        let mut report = ShutdownReport::default();
        for (handle, lifecycle) in order {
            let name = handle.name;
            let outcome = match lifecycle {
                None => Ok(()),
                Some(lifecycle) => match AssertUnwindSafe(lifecycle.shutdown()).catch_unwind().await {
                    Ok(result) => result.map_err(|e| e.to_string()),
                    Err(_) => Err("shutdown panicked".to_string()),
                },
            };

            match outcome {
                Ok(()) => {
                    debug!(component = %name, "Component stopped");
                    if let Some(mut entry) = self.entries.get_mut(&name) {
                        entry.handle.healthy = false;
                        entry.handle.last_error = Some("shut down".to_string());
                    }
                    report.stopped.push(name);
                }
                Err(error) => {
                    warn!(component = %name, error = %error, "Component shutdown failed");
                    report.failed.push((name, error));
                }
            }
        }

        info!(
            stopped = report.stopped.len(),
            failed = report.failed.len(),
            "Registry shutdown complete"
        );
        report
    }

    fn entry_mut(
        &self,
        name: &str,
    ) -> RegistryResult<dashmap::mapref::one::RefMut<'_, ComponentId, RegistryEntry>> {
        self.entries
            .get_mut(name)
            .ok_or_else(|| RegistryError::ComponentNotFound(ComponentId::new(name)))
    }
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

//! Priority queues, debounce filter and dispatch

use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bulwark_audit::{AuditRecord, AuditSink, NullAuditSink};
use bulwark_types::{ComponentId, Event, EventPriority, TraceId};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Notify};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::config::EventPipelineConfig;
use crate::dispatcher::DispatcherHandle;
use crate::handler::{EventHandler, SubscriptionId, WILDCARD};

/// What happened to a published event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Queued for dispatch and written to the audit log
    Enqueued { trace_id: TraceId },
    /// Dropped as a repeat inside the debounce window
    Debounced,
}

impl PublishOutcome {
    pub fn is_enqueued(&self) -> bool {
        matches!(self, PublishOutcome::Enqueued { .. })
    }
}

/// Pipeline counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStats {
    pub published: u64,
    pub debounced: u64,
    pub dispatched: u64,
    pub handler_failures: u64,
    pub audit_failures: u64,
}

#[derive(Default)]
struct Counters {
    published: AtomicU64,
    debounced: AtomicU64,
    dispatched: AtomicU64,
    handler_failures: AtomicU64,
    audit_failures: AtomicU64,
}

struct Subscription {
    id: SubscriptionId,
    event_type: String,
    handler: Arc<dyn EventHandler>,
}

impl Subscription {
    fn matches(&self, event: &Event) -> bool {
        self.event_type == WILDCARD || self.event_type == event.event_type
    }
}

/// Priority-stratified, debounced pub/sub bus.
pub struct EventPipeline {
    config: EventPipelineConfig,

    /// One FIFO per priority, indexed by [`EventPriority::queue_index`]
    queues: Mutex<[VecDeque<Event>; 4]>,

    /// Wakes the dispatcher when something is queued
    ready: Notify,

    /// Last accepted publish time per `(type, source)`
    last_accepted: DashMap<(String, ComponentId), Instant>,
    last_pruned: Mutex<Instant>,

    subscriptions: RwLock<Vec<Subscription>>,
    next_subscription: AtomicU64,

    audit: Arc<dyn AuditSink>,
    counters: Counters,
}

impl EventPipeline {
    pub fn new(config: EventPipelineConfig, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            config,
            queues: Mutex::new(Default::default()),
            ready: Notify::new(),
            last_accepted: DashMap::new(),
            last_pruned: Mutex::new(Instant::now()),
            subscriptions: RwLock::new(Vec::new()),
            next_subscription: AtomicU64::new(1),
            audit,
            counters: Counters::default(),
        }
    }

    /// Pipeline without an audit log.
    pub fn in_memory(config: EventPipelineConfig) -> Self {
        Self::new(config, Arc::new(NullAuditSink))
    }

    pub fn config(&self) -> &EventPipelineConfig {
        &self.config
    }

    /// Publish an event.
    ///
    /// Fills in missing trace and span ids, applies the debounce filter
    /// (critical events bypass it), queues the event and appends it to the
    /// audit log. An audit failure is logged and does not affect delivery.
    #[instrument(skip(self, event), fields(event_type = %event.event_type, source = %event.source))]
    pub async fn publish(&self, mut event: Event) -> PublishOutcome {
        let trace_id = event.ensure_trace();

        if !event.priority.bypasses_debounce() && self.is_repeat(&event) {
            self.counters.debounced.fetch_add(1, Ordering::Relaxed);
            debug!(priority = %event.priority, "Debounced repeat event");
            return PublishOutcome::Debounced;
        }

        let record = audit_record(&event);

        {
            let mut queues = self.queues.lock();
            queues[event.priority.queue_index()].push_back(event);
        }
        self.counters.published.fetch_add(1, Ordering::Relaxed);
        self.ready.notify_one();

        if let Err(e) = self.audit.append(record).await {
            self.counters.audit_failures.fetch_add(1, Ordering::Relaxed);
            warn!(trace_id = %trace_id, error = %e, "Failed to append event to audit log");
        }

        PublishOutcome::Enqueued { trace_id }
    }

    /// Register a handler for one event type, or [`WILDCARD`] for all.
    pub fn subscribe(
        &self,
        event_type: impl Into<String>,
        handler: Arc<dyn EventHandler>,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        let event_type = event_type.into();
        debug!(subscription = %id, event_type = %event_type, "Handler subscribed");
        self.subscriptions.write().push(Subscription {
            id,
            event_type,
            handler,
        });
        id
    }

    /// Remove a subscription; returns whether it existed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subs = self.subscriptions.write();
        let before = subs.len();
        subs.retain(|s| s.id != id);
        subs.len() != before
    }

    /// Number of queued events per priority, in dispatch order.
    pub fn pending_by_priority(&self) -> [usize; 4] {
        let queues = self.queues.lock();
        [
            queues[0].len(),
            queues[1].len(),
            queues[2].len(),
            queues[3].len(),
        ]
    }

    /// Total number of queued events.
    pub fn pending(&self) -> usize {
        self.pending_by_priority().iter().sum()
    }

    /// `(type, source)` keys currently held by the debounce filter.
    pub fn debounce_keys(&self) -> usize {
        self.last_accepted.len()
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            published: self.counters.published.load(Ordering::Relaxed),
            debounced: self.counters.debounced.load(Ordering::Relaxed),
            dispatched: self.counters.dispatched.load(Ordering::Relaxed),
            handler_failures: self.counters.handler_failures.load(Ordering::Relaxed),
            audit_failures: self.counters.audit_failures.load(Ordering::Relaxed),
        }
    }

    /// Dispatch every queued event on the caller's task. Returns how many
    /// events were delivered.
    pub async fn drain(&self) -> usize {
        let mut delivered = 0;
        while let Some(event) = self.pop_next() {
            self.dispatch(event).await;
            delivered += 1;
        }
        delivered
    }

    /// Dispatch loop. Returns once `shutdown` flips to `true` (or its sender
    /// is dropped), after finishing the event in flight.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!("Event dispatcher started");
        loop {
            if *shutdown.borrow() {
                break;
            }

            if let Some(event) = self.pop_next() {
                self.dispatch(event).await;
                continue;
            }

            tokio::select! {
                _ = self.ready.notified() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        info!(pending = self.pending(), "Event dispatcher stopped");
    }

    /// Run the dispatch loop on a background task.
    pub fn spawn(self: &Arc<Self>) -> DispatcherHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let pipeline = Arc::clone(self);
        let task = tokio::spawn(async move { pipeline.run(shutdown_rx).await });
        DispatcherHandle::new(shutdown_tx, task)
    }

    /// Record a publish and report whether it repeats one accepted inside
    /// the window. Dropped repeats do not extend the window.
    fn is_repeat(&self, event: &Event) -> bool {
        let now = Instant::now();
        let window = self.config.debounce_window();
        let repeat = match self.last_accepted.entry(event.debounce_key()) {
            Entry::Occupied(mut last) => {
                if now.saturating_duration_since(*last.get()) < window {
                    true
                } else {
                    last.insert(now);
                    false
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(now);
                false
            }
        };
        self.prune_expired(now, window);
        repeat
    }

    /// Drop keys whose window has passed. Runs at most once per window.
    fn prune_expired(&self, now: Instant, window: Duration) {
        {
            let mut last = self.last_pruned.lock();
            if now.saturating_duration_since(*last) < window {
                return;
            }
            *last = now;
        }
        let before = self.last_accepted.len();
        self.last_accepted
            .retain(|_, accepted| now.saturating_duration_since(*accepted) < window);
        let pruned = before.saturating_sub(self.last_accepted.len());
        if pruned > 0 {
            debug!(pruned, "Pruned expired debounce keys");
        }
    }

    fn pop_next(&self) -> Option<Event> {
        let mut queues = self.queues.lock();
        EventPriority::ALL
            .iter()
            .find_map(|p| queues[p.queue_index()].pop_front())
    }

    async fn dispatch(&self, event: Event) {
        let handlers: Vec<(SubscriptionId, Arc<dyn EventHandler>)> = self
            .subscriptions
            .read()
            .iter()
            .filter(|s| s.matches(&event))
            .map(|s| (s.id, Arc::clone(&s.handler)))
            .collect();

        for (id, handler) in handlers {
            match AssertUnwindSafe(handler.handle(&event)).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    self.counters.handler_failures.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        subscription = %id,
                        event_type = %event.event_type,
                        error = %e,
                        "Event handler failed"
                    );
                }
                Err(_) => {
                    self.counters.handler_failures.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        subscription = %id,
                        event_type = %event.event_type,
                        "Event handler panicked"
                    );
                }
            }
        }

        self.counters.dispatched.fetch_add(1, Ordering::Relaxed);
    }
}

fn audit_record(event: &Event) -> AuditRecord {
    AuditRecord::new("event")
        .field("trace_id", &event.trace_id)
        .field("span_id", &event.span_id)
        .field("event_type", &event.event_type)
        .field("source", &event.source)
        .field("priority", event.priority)
        .field("payload", &event.payload)
        .field("published_at", event.timestamp)
}

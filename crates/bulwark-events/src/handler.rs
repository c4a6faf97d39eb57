//! Subscriber side of the pipeline

use crate::error::EventResult;
use async_trait::async_trait;
use bulwark_types::Event;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Subscribing with this type receives every event.
pub const WILDCARD: &str = "*";

/// Receives dispatched events.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &Event) -> EventResult<()>;
}

/// Adapts a synchronous closure into an [`EventHandler`].
pub struct FnHandler<F>(F);

impl<F> FnHandler<F>
where
    F: Fn(&Event) -> EventResult<()> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F> EventHandler for FnHandler<F>
where
    F: Fn(&Event) -> EventResult<()> + Send + Sync,
{
    async fn handle(&self, event: &Event) -> EventResult<()> {
        (self.0)(event)
    }
}

/// Identifies a subscription for later removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(pub(crate) u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

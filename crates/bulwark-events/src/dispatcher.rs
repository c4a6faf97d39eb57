//! Handle to a background dispatch loop

use crate::error::{EventError, EventResult};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

/// Owns a running dispatcher task; see [`crate::EventPipeline::spawn`].
pub struct DispatcherHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl DispatcherHandle {
    pub(crate) fn new(shutdown: watch::Sender<bool>, task: JoinHandle<()>) -> Self {
        Self { shutdown, task }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Signal cancellation and wait for the loop to finish its in-flight event.
    pub async fn stop(self) -> EventResult<()> {
        debug!("Stopping event dispatcher");
        // The receiver is gone only if the loop already exited.
        let _ = self.shutdown.send(true);
        self.task
            .await
            .map_err(|e| EventError::Dispatcher(e.to_string()))
    }
}

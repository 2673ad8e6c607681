//! Progress reporting for training runners.
//!
//! Events are broadcast to any number of subscribers. Delivery is best-effort:
//! a subscriber that falls behind the channel capacity loses the oldest
//! events, and nothing is persisted.

use std::sync::Mutex;

use lathe_training::{JobStatus, ProgressEvent, ProgressSink};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

const CHANNEL_CAPACITY: usize = 256;

/// Aggregate counters over every event seen.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProgressMetrics {
    pub started: u64,
    pub checkpoints: u64,
    pub completed: u64,
    pub failed: u64,
    pub stopped: u64,
}

impl ProgressMetrics {
    /// Runners that have started and not yet finished.
    #[must_use]
    pub fn active(&self) -> u64 {
        self.started.saturating_sub(self.completed + self.failed + self.stopped)
    }
}

/// Progress reporter for training runners.
#[derive(Debug)]
pub struct ProgressReporter {
    broadcast_tx: broadcast::Sender<ProgressEvent>,
    metrics: Mutex<ProgressMetrics>,
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter {
    #[must_use]
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { broadcast_tx, metrics: Mutex::new(ProgressMetrics::default()) }
    }

    /// Subscribes to events emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.broadcast_tx.subscribe()
    }

    /// Gets the current progress metrics snapshot.
    pub fn snapshot(&self) -> ProgressMetrics {
        self.metrics.lock().map(|m| m.clone()).unwrap_or_default()
    }
}

impl ProgressSink for ProgressReporter {
    fn on_event(&self, event: ProgressEvent) {
        if let Ok(mut metrics) = self.metrics.lock() {
            match &event {
                ProgressEvent::Started { .. } => metrics.started += 1,
                ProgressEvent::Checkpoint { .. } => metrics.checkpoints += 1,
                ProgressEvent::Finished { status: JobStatus::Completed, .. } => {
                    metrics.completed += 1;
                }
                ProgressEvent::Finished { status: JobStatus::Failed, .. } => metrics.failed += 1,
                ProgressEvent::Finished { status: JobStatus::Stopped, .. } => metrics.stopped += 1,
                ProgressEvent::Finished { .. } | ProgressEvent::Message { .. } => {}
            }
        }
        debug!("Progress event: {:?}", event);
        // No subscribers is fine.
        let _ = self.broadcast_tx.send(event);
    }
}

//! Diagnostic hooks for the pipeline.
//!
//! Components never log through a process-wide handle; they are given an
//! `Arc<dyn Observer>` and report [`Event`]s to it. Pick [`NoopObserver`]
//! to stay silent, [`TracingObserver`] to forward to `tracing`, or
//! [`BroadcastObserver`] to let several consumers subscribe.

use tokio::sync::broadcast;

use crate::types::Event;

/// Receives pipeline events.
///
/// Called from worker tasks and the archive writer thread, so
/// implementations must be cheap and must not block.
pub trait Observer: Send + Sync {
    /// Handle one event
    fn on_event(&self, event: &Event);
}

/// Observer that discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl Observer for NoopObserver {
    fn on_event(&self, _event: &Event) {}
}

/// Observer that forwards events to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn on_event(&self, event: &Event) {
        match event {
            Event::FetchStarted {
                index,
                artist,
                title,
                url,
            } => {
                tracing::debug!(index, artist = %artist, title = %title, url = %url, "Downloading item");
            }
            Event::FetchSucceeded {
                index,
                entry_name,
                bytes,
            } => {
                tracing::info!(index, entry_name = %entry_name, bytes, "Processed album item");
            }
            Event::FetchFailed { index, url, error } => {
                tracing::error!(index, url = %url, error = %error, "Unable to download item");
            }
            Event::EntryWritten { entry_name, bytes } => {
                tracing::debug!(entry_name = %entry_name, bytes, "Entry written to archive");
            }
            Event::EnqueueStopped { enqueued, total } => {
                tracing::info!(enqueued, total, "Stopped enqueueing items early");
            }
            Event::WorkerAborted { worker_id, error } => {
                tracing::error!(worker_id, error = %error, "Fetch worker terminated abnormally");
            }
            Event::JobCompleted { archived, failed } => {
                if *failed > 0 {
                    tracing::warn!(archived, failed, "Archive completed with some failures");
                } else {
                    tracing::debug!(archived, "Archive completed");
                }
            }
            Event::JobFailed { error } => {
                tracing::error!(error = %error, "Archive job failed");
            }
        }
    }
}

/// Observer that publishes events on a broadcast channel.
///
/// Slow subscribers lag and miss events rather than stalling the pipeline.
#[derive(Debug, Clone)]
pub struct BroadcastObserver {
    event_tx: broadcast::Sender<Event>,
}

impl BroadcastObserver {
    /// Create an observer whose channel buffers `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (event_tx, _) = broadcast::channel(capacity.max(1));
        Self { event_tx }
    }

    /// Subscribe to events published after this call
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }
}

impl Observer for BroadcastObserver {
    fn on_event(&self, event: &Event) {
        // No subscribers is not an error
        self.event_tx.send(event.clone()).ok();
    }
}

//! Progress reporting for batch runs
//!
//! The engine emits a [`ProgressUpdate`] at every checkpoint interval and
//! chunk boundary. Updates go to a structured log entry and, best-effort, to
//! a [`ProgressSink`]; a sink that fails or has no listeners never affects
//! the run.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// One progress observation from a running batch
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    /// Items processed so far across the logical run
    pub current: u64,
    /// Total items in the input sequence
    pub total: u64,
    /// Rounded completion percentage (0 when `total` is 0)
    pub percent: u8,
    /// Human-readable status line
    pub message: String,
    /// 1-based number of the chunk being processed
    pub current_batch: u64,
    /// Total number of chunks in the run
    pub total_batches: u64,
}

impl ProgressUpdate {
    /// Rounded completion percentage, defensively treating an empty total
    /// as 0% rather than dividing by zero
    pub fn percent_of(current: u64, total: u64) -> u8 {
        if total == 0 {
            return 0;
        }
        ((current as f64 / total as f64) * 100.0).round() as u8
    }
}

/// Best-effort destination for progress updates
///
/// Implementations must not block the batch; delivery failures are theirs
/// to swallow.
pub trait ProgressSink: Send + Sync {
    /// Deliver one update
    fn publish(&self, update: &ProgressUpdate);
}

/// Sink that discards every update
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn publish(&self, _update: &ProgressUpdate) {}
}

/// Broadcast-channel sink
///
/// Consumers call [`subscribe`](ChannelSink::subscribe) and receive every
/// update published while they are listening. Publishing with no listeners
/// is a no-op.
#[derive(Clone, Debug)]
pub struct ChannelSink {
    tx: broadcast::Sender<ProgressUpdate>,
}

impl ChannelSink {
    /// Create a sink with the given channel capacity
    ///
    /// Slow consumers that fall more than `capacity` updates behind see a
    /// `Lagged` error on their receiver; the sink itself never blocks.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to future updates
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressUpdate> {
        self.tx.subscribe()
    }
}

impl Default for ChannelSink {
    fn default() -> Self {
        Self::new(64)
    }
}

impl ProgressSink for ChannelSink {
    fn publish(&self, update: &ProgressUpdate) {
        // send only fails when there are no receivers; that's fine
        let _ = self.tx.send(update.clone());
    }
}

/// Forwards progress to the log and a sink
#[derive(Clone)]
pub struct ProgressReporter {
    sink: Arc<dyn ProgressSink>,
}

impl ProgressReporter {
    /// Create a reporter forwarding to `sink`
    pub fn new(sink: Arc<dyn ProgressSink>) -> Self {
        Self { sink }
    }

    /// Report progress for the current run
    pub fn report(
        &self,
        current: u64,
        total: u64,
        message: impl Into<String>,
        current_batch: u64,
        total_batches: u64,
    ) {
        let update = ProgressUpdate {
            current,
            total,
            percent: ProgressUpdate::percent_of(current, total),
            message: message.into(),
            current_batch,
            total_batches,
        };

        tracing::info!(
            current = update.current,
            total = update.total,
            percent = update.percent,
            current_batch = update.current_batch,
            total_batches = update.total_batches,
            "{}",
            update.message
        );

        self.sink.publish(&update);
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new(Arc::new(NullSink))
    }
}

//! Core types for resumable-batch

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Identifier for a logical batch run
///
/// The id is the unit of resumability: a checkpoint saved under a
/// `ProcessId` is picked up by the next run with the same id. Callers that
/// need to resume across process restarts must supply a stable identifier;
/// item index alone is not the identity.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessId(pub String);

impl ProcessId {
    /// Create a new ProcessId
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ProcessId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ProcessId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for ProcessId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Status of a batch run
///
/// This is the contractual vocabulary callers branch on. `Processing` only
/// ever appears in persisted checkpoints; the remaining values are returned
/// to the caller as terminal signals for one invocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessStatus {
    /// Run in progress (checkpoint-only status)
    Processing,
    /// All items processed; checkpoint cleared
    Completed,
    /// Stopped at a chunk boundary because the cancellation flag was set
    Cancelled,
    /// Stopped because the hard execution ceiling was crossed
    Timeout,
    /// Stopped before the external ceiling by the soft time limit
    SafeTimeout,
    /// Engine-level failure; checkpoint left in place for operator review
    Error,
}

impl ProcessStatus {
    /// Whether this status ends an invocation (everything except `Processing`)
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ProcessStatus::Processing)
    }

    /// Whether a run with this status can be re-invoked without operator
    /// intervention
    ///
    /// `Cancelled` and `Error` checkpoints survive too, but resuming them is
    /// an operator decision rather than an automatic retry.
    pub fn is_resumable(&self) -> bool {
        matches!(self, ProcessStatus::Timeout | ProcessStatus::SafeTimeout)
    }
}

impl std::fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProcessStatus::Processing => "processing",
            ProcessStatus::Completed => "completed",
            ProcessStatus::Cancelled => "cancelled",
            ProcessStatus::Timeout => "timeout",
            ProcessStatus::SafeTimeout => "safe_timeout",
            ProcessStatus::Error => "error",
        };
        write!(f, "{s}")
    }
}

/// Durable checkpoint describing how far a batch run has progressed
///
/// Saved after every chunk and every checkpoint interval, and deleted only
/// when the run completes. Any other terminal status leaves the record in
/// place so the next invocation can resume from `last_processed_index + 1`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProcessState {
    /// Id of the logical run this checkpoint belongs to
    pub process_id: String,

    /// Index of the last item fully processed (-1 = none yet)
    pub last_processed_index: i64,

    /// Total items processed so far, including failures
    pub processed_count: u64,

    /// Items whose processor reported success
    pub success_count: u64,

    /// Items whose processor reported or raised a failure
    pub error_count: u64,

    /// Status at the time of the checkpoint write
    pub status: ProcessStatus,

    /// Error message when `status` is [`ProcessStatus::Error`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// When the checkpoint was written
    pub timestamp: DateTime<Utc>,
}

impl ProcessState {
    /// Index the next invocation should resume from
    pub fn resume_index(&self) -> usize {
        (self.last_processed_index + 1).max(0) as usize
    }

    /// Whether the counters satisfy `processed == success + error`
    pub fn is_consistent(&self) -> bool {
        self.processed_count == self.success_count + self.error_count
    }
}

/// Aggregate result of one engine invocation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    /// How the invocation ended
    pub status: ProcessStatus,

    /// Total items processed across the logical run, including any carried
    /// over from a resumed checkpoint
    pub processed_count: u64,

    /// Successful items across the logical run
    pub success_count: u64,

    /// Failed items across the logical run
    pub error_count: u64,

    /// Wall time spent in this invocation
    #[serde(with = "duration_ms")]
    pub elapsed: Duration,
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

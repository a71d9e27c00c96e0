//! Configuration types for resumable-batch

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Batch engine configuration
///
/// Delays are pure rate-limiting pauses for the benefit of whatever external
/// service the item processor talks to; the engine never uses them to yield
/// to other work. Time limits govern the voluntary early-exit checks at
/// chunk boundaries: `soft_time_limit` must stay below `hard_time_limit`,
/// which in turn should sit below whatever ceiling the hosting environment
/// enforces with a kill.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Items processed per chunk before a pause/yield point (default: 5)
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Delay between items within a chunk (default: 500 ms)
    #[serde(default = "default_item_delay", with = "duration_ms_serde")]
    pub item_delay: Duration,

    /// Delay between chunks (default: 2 seconds)
    #[serde(default = "default_batch_delay", with = "duration_ms_serde")]
    pub batch_delay: Duration,

    /// Elapsed-time threshold for a safe early stop (default: 4 min 30 s)
    #[serde(default = "default_soft_time_limit", with = "duration_ms_serde")]
    pub soft_time_limit: Duration,

    /// Elapsed-time threshold mirroring the external execution ceiling
    /// (default: 5 min 30 s)
    #[serde(default = "default_hard_time_limit", with = "duration_ms_serde")]
    pub hard_time_limit: Duration,

    /// Persist a checkpoint every N processed items (default: 10)
    ///
    /// Chunk boundaries always checkpoint regardless of this interval.
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval: usize,

    /// Retry budget for item processors (default: 3 attempts)
    ///
    /// The engine never retries an item itself; processors opt in via
    /// [`retry_with_backoff`](crate::retry::retry_with_backoff).
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            item_delay: default_item_delay(),
            batch_delay: default_batch_delay(),
            soft_time_limit: default_soft_time_limit(),
            hard_time_limit: default_hard_time_limit(),
            checkpoint_interval: default_checkpoint_interval(),
            retry: RetryConfig::default(),
        }
    }
}

impl BatchConfig {
    /// Validate the configuration
    ///
    /// Returns [`Error::Config`] naming the offending field.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::config("batch_size", "batch_size must be positive"));
        }
        if self.checkpoint_interval == 0 {
            return Err(Error::config(
                "checkpoint_interval",
                "checkpoint_interval must be positive",
            ));
        }
        if self.soft_time_limit > self.hard_time_limit {
            return Err(Error::config(
                "soft_time_limit",
                "soft_time_limit must not exceed hard_time_limit",
            ));
        }
        Ok(())
    }
}

/// Retry configuration for transient item-processor failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_ms_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 5 seconds)
    #[serde(default = "default_max_delay", with = "duration_ms_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

fn default_batch_size() -> usize {
    5
}

fn default_item_delay() -> Duration {
    Duration::from_millis(500)
}

fn default_batch_delay() -> Duration {
    Duration::from_secs(2)
}

fn default_soft_time_limit() -> Duration {
    Duration::from_secs(270)
}

fn default_hard_time_limit() -> Duration {
    Duration::from_secs(330)
}

fn default_checkpoint_interval() -> usize {
    10
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(5)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

// Duration serialization helper (milliseconds)
mod duration_ms_serde {
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

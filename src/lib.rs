//! # resumable-batch
//!
//! Resumable, time-budgeted batch processing with durable checkpoints.
//!
//! ## Design Philosophy
//!
//! resumable-batch is designed to be:
//! - **Interruption-tolerant** - Runs that hit a time budget, a cancellation
//!   request, or an engine failure leave a checkpoint and resume exactly
//!   where they stopped
//! - **Failure-isolating** - A failed item is counted and logged, never
//!   aborts the batch
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Store-agnostic** - Checkpoints go through a [`StateStore`] trait;
//!   SQLite and in-memory implementations ship in the box
//!
//! ## Quick Start
//!
//! ```no_run
//! use resumable_batch::{
//!     BatchConfig, BatchEngine, FnProcessor, ItemOutcome, ProcessId, SqliteStore,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(SqliteStore::new("state/batch.db").await?);
//!     let engine = BatchEngine::new(store, BatchConfig::default())?;
//!
//!     let codes: Vec<String> = vec!["7203".into(), "9984".into(), "6758".into()];
//!     let processor = FnProcessor::new(|code: &String, _index| {
//!         // fetch and record the latest quote for `code` here
//!         Ok(ItemOutcome::Success)
//!     });
//!
//!     // A rerun with the same process id resumes from the last checkpoint
//!     let report = engine
//!         .run(&ProcessId::from("nightly_refresh"), &codes, &processor)
//!         .await?;
//!     println!("{}: {}/{} ok", report.status, report.success_count, report.processed_count);
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Elapsed-time tracking with an injectable clock
pub mod clock;
/// Configuration types
pub mod config;
/// The chunked, checkpointing batch engine
pub mod engine;
/// Error types
pub mod error;
/// Item processor contract
pub mod processor;
/// Progress reporting
pub mod progress;
/// Retry logic with exponential backoff
pub mod retry;
/// Durable state persistence layer
pub mod store;
/// Core types: process ids, statuses, checkpoints, reports
pub mod types;

// Re-export commonly used types
pub use clock::{Clock, ExecutionClock, ManualClock, SystemClock};
pub use config::{BatchConfig, RetryConfig};
pub use engine::{BatchEngine, NoopWatchdog, Watchdog};
pub use error::{Error, Result, StoreError};
pub use processor::{FnProcessor, ItemOutcome, ItemProcessor};
pub use progress::{ChannelSink, NullSink, ProgressReporter, ProgressSink, ProgressUpdate};
pub use retry::{IsRetryable, retry_with_backoff};
pub use store::{Checkpoints, MemoryStore, SqliteStore, StateStore};
pub use types::{BatchReport, ProcessId, ProcessState, ProcessStatus};

//! The resumable batch engine
//!
//! Drives an ordered item sequence through a processor in `batch_size`
//! chunks, checkpointing progress so a run that stops early (cancellation,
//! soft or hard time limit, engine failure) can be resumed exactly where it
//! left off by a later invocation with the same [`ProcessId`].
//!
//! The engine is a cooperative, single-task step loop. Cancellation and
//! time-budget checks happen at chunk boundaries only; an in-flight item
//! always runs to completion. Per-item failures are data: they are counted,
//! logged, and never abort the batch.
//!
//! # Example
//!
//! ```no_run
//! use resumable_batch::{
//!     BatchConfig, BatchEngine, FnProcessor, ItemOutcome, MemoryStore, ProcessId,
//! };
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = BatchEngine::new(Arc::new(MemoryStore::new()), BatchConfig::default())?;
//!
//! let codes = vec!["7203".to_string(), "9984".to_string()];
//! let processor = FnProcessor::new(|code: &String, _index| {
//!     // fetch and record the quote for `code` here
//!     Ok(ItemOutcome::Success)
//! });
//!
//! let report = engine
//!     .run(&ProcessId::from("nightly_refresh"), &codes, &processor)
//!     .await?;
//! println!("{}: {}/{} ok", report.status, report.success_count, report.processed_count);
//! # Ok(())
//! # }
//! ```

use crate::clock::{Clock, ExecutionClock, SystemClock};
use crate::config::BatchConfig;
use crate::error::{Error, Result};
use crate::processor::{ItemOutcome, ItemProcessor};
use crate::progress::{ProgressReporter, ProgressSink, ProgressUpdate};
use crate::store::{Checkpoints, StateStore};
use crate::types::{BatchReport, ProcessId, ProcessState, ProcessStatus};
use async_trait::async_trait;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// External timeout-trigger resource armed for the duration of a run
///
/// Models an environment-level dead-man switch (a trigger that fires if the
/// process is killed before disarming). [`disarm`](Watchdog::disarm) runs on
/// every exit path, including early exits and engine failure.
#[async_trait]
pub trait Watchdog: Send + Sync {
    /// Arm the external resource before processing starts
    async fn arm(&self);

    /// Release the external resource; called on every exit path
    async fn disarm(&self);
}

/// Watchdog that does nothing
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopWatchdog;

#[async_trait]
impl Watchdog for NoopWatchdog {
    async fn arm(&self) {}
    async fn disarm(&self) {}
}

/// Running tally for one logical run, carried across resumes
struct Tally {
    processed: u64,
    successes: u64,
    failures: u64,
    last_index: i64,
}

impl Tally {
    fn fresh() -> Self {
        Self {
            processed: 0,
            successes: 0,
            failures: 0,
            last_index: -1,
        }
    }

    fn from_checkpoint(state: &ProcessState) -> Self {
        Self {
            processed: state.processed_count,
            successes: state.success_count,
            failures: state.error_count,
            last_index: state.last_processed_index,
        }
    }
}

/// Resumable batch engine
///
/// One engine instance may serve many runs; each `run` call owns its own
/// clock and tally. Callers must not run two engines concurrently for the
/// same [`ProcessId`]: checkpoints are last-write-wins and the engine does
/// no locking.
pub struct BatchEngine {
    checkpoints: Checkpoints,
    config: BatchConfig,
    reporter: ProgressReporter,
    clock: Arc<dyn Clock>,
    watchdog: Arc<dyn Watchdog>,
}

impl BatchEngine {
    /// Create an engine over a state store
    ///
    /// Fails with [`Error::Config`] when the configuration is invalid.
    pub fn new(store: Arc<dyn StateStore>, config: BatchConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            checkpoints: Checkpoints::new(store),
            config,
            reporter: ProgressReporter::default(),
            clock: Arc::new(SystemClock),
            watchdog: Arc::new(NoopWatchdog),
        })
    }

    /// Replace the progress sink
    pub fn with_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.reporter = ProgressReporter::new(sink);
        self
    }

    /// Replace the clock source (tests inject a manual clock here)
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Attach an external watchdog armed for the duration of each run
    pub fn with_watchdog(mut self, watchdog: Arc<dyn Watchdog>) -> Self {
        self.watchdog = watchdog;
        self
    }

    /// Checkpoint accessor, shared with control paths
    ///
    /// Use this to request or reset cancellation from outside the run.
    pub fn checkpoints(&self) -> &Checkpoints {
        &self.checkpoints
    }

    /// Process `items`, resuming from a saved checkpoint if one exists
    ///
    /// Returns a [`BatchReport`] whose counters span the whole logical run,
    /// including items processed by earlier invocations of the same
    /// `process_id`. A missing checkpoint means a fresh run from index 0.
    ///
    /// # Errors
    ///
    /// Only engine-level setup problems (empty `process_id`) return `Err`.
    /// Item failures are tallied into the report instead.
    pub async fn run<T, P>(
        &self,
        process_id: &ProcessId,
        items: &[T],
        processor: &P,
    ) -> Result<BatchReport>
    where
        T: Send + Sync,
        P: ItemProcessor<T> + ?Sized,
    {
        if process_id.as_str().is_empty() {
            return Err(Error::config("process_id", "process_id must not be empty"));
        }

        let saved = self.checkpoints.load_state(process_id).await;
        let start_index = saved.as_ref().map(|s| s.resume_index()).unwrap_or(0);
        let mut tally = saved
            .as_ref()
            .map(Tally::from_checkpoint)
            .unwrap_or_else(Tally::fresh);

        tracing::info!(
            process_id = %process_id,
            total_items = items.len(),
            start_index = start_index,
            batch_size = self.config.batch_size,
            resumed = saved.is_some(),
            "Starting batch run"
        );

        let clock = ExecutionClock::start(Arc::clone(&self.clock));

        // Everything already done: complete immediately, zero processor calls
        if start_index >= items.len() {
            self.persist(process_id, ProcessStatus::Completed, &tally, None)
                .await;
            self.checkpoints.clear_state(process_id).await;
            return Ok(self.report(ProcessStatus::Completed, &tally, &clock));
        }

        self.watchdog.arm().await;

        let drive = self.drive(process_id, items, processor, &mut tally, &clock, start_index);
        let outcome = AssertUnwindSafe(drive).catch_unwind().await;

        self.watchdog.disarm().await;

        match outcome {
            Ok(report) => Ok(report),
            Err(payload) => {
                // The analogue of an exception escaping the loop: persist an
                // error checkpoint at the last fully processed item, then
                // let the panic continue to the caller.
                let message = panic_message(payload.as_ref());
                tracing::error!(
                    process_id = %process_id,
                    error = %message,
                    last_processed_index = tally.last_index,
                    "Batch run failed; checkpoint preserved for resumption"
                );
                self.persist(process_id, ProcessStatus::Error, &tally, Some(message))
                    .await;
                std::panic::resume_unwind(payload);
            }
        }
    }

    /// Discard any checkpoint for `process_id` and run from index 0
    pub async fn restart<T, P>(
        &self,
        process_id: &ProcessId,
        items: &[T],
        processor: &P,
    ) -> Result<BatchReport>
    where
        T: Send + Sync,
        P: ItemProcessor<T> + ?Sized,
    {
        self.checkpoints.clear_state(process_id).await;
        self.run(process_id, items, processor).await
    }

    /// The chunked processing loop
    async fn drive<T, P>(
        &self,
        process_id: &ProcessId,
        items: &[T],
        processor: &P,
        tally: &mut Tally,
        clock: &ExecutionClock,
        start_index: usize,
    ) -> BatchReport
    where
        T: Send + Sync,
        P: ItemProcessor<T> + ?Sized,
    {
        let total = items.len();
        let batch_size = self.config.batch_size;
        let total_batches = total.div_ceil(batch_size) as u64;

        let mut chunk_start = start_index;
        while chunk_start < total {
            let chunk_end = (chunk_start + batch_size).min(total);
            let current_batch = (chunk_start / batch_size) as u64 + 1;

            // Cooperative exit checks, chunk boundaries only: an in-flight
            // item always runs to completion.
            if self.checkpoints.cancel_requested().await {
                tracing::info!(
                    process_id = %process_id,
                    processed = tally.processed,
                    "Cancellation requested, stopping batch run"
                );
                self.persist(process_id, ProcessStatus::Cancelled, tally, None)
                    .await;
                return self.report(ProcessStatus::Cancelled, tally, clock);
            }
            if clock.is_over_budget(self.config.hard_time_limit) {
                tracing::warn!(
                    process_id = %process_id,
                    elapsed_ms = clock.elapsed().as_millis() as u64,
                    processed = tally.processed,
                    total = total,
                    "Hard time limit crossed, stopping batch run"
                );
                self.persist(process_id, ProcessStatus::Timeout, tally, None)
                    .await;
                return self.report(ProcessStatus::Timeout, tally, clock);
            }
            if clock.is_over_budget(self.config.soft_time_limit) {
                tracing::warn!(
                    process_id = %process_id,
                    elapsed_ms = clock.elapsed().as_millis() as u64,
                    processed = tally.processed,
                    total = total,
                    "Soft time limit reached, stopping early with resumable checkpoint"
                );
                self.persist(process_id, ProcessStatus::SafeTimeout, tally, None)
                    .await;
                return self.report(ProcessStatus::SafeTimeout, tally, clock);
            }

            tracing::debug!(
                process_id = %process_id,
                current_batch = current_batch,
                total_batches = total_batches,
                chunk_start = chunk_start,
                chunk_end = chunk_end,
                "Processing batch"
            );

            for index in chunk_start..chunk_end {
                match processor.process(&items[index], index, items).await {
                    Ok(ItemOutcome::Success) => tally.successes += 1,
                    Ok(ItemOutcome::Failed(detail)) => {
                        tally.failures += 1;
                        tracing::warn!(
                            process_id = %process_id,
                            index = index,
                            detail = %detail,
                            "Item reported failure"
                        );
                    }
                    Err(e) => {
                        tally.failures += 1;
                        tracing::error!(
                            process_id = %process_id,
                            index = index,
                            error = %e,
                            "Item processing failed"
                        );
                    }
                }
                tally.processed += 1;
                tally.last_index = index as i64;

                if tally.processed % self.config.checkpoint_interval as u64 == 0 {
                    self.persist(process_id, ProcessStatus::Processing, tally, None)
                        .await;
                    self.report_progress(tally, total, current_batch, total_batches);
                }

                // Rate-limiting pause, skipped after the last item of a chunk
                if index + 1 < chunk_end && !self.config.item_delay.is_zero() {
                    tokio::time::sleep(self.config.item_delay).await;
                }
            }

            self.persist(process_id, ProcessStatus::Processing, tally, None)
                .await;
            self.report_progress(tally, total, current_batch, total_batches);

            chunk_start = chunk_end;
            if chunk_start < total && !self.config.batch_delay.is_zero() {
                tokio::time::sleep(self.config.batch_delay).await;
            }
        }

        tracing::info!(
            process_id = %process_id,
            processed = tally.processed,
            successes = tally.successes,
            failures = tally.failures,
            elapsed_ms = clock.elapsed().as_millis() as u64,
            "Batch run completed"
        );
        self.persist(process_id, ProcessStatus::Completed, tally, None)
            .await;
        self.checkpoints.clear_state(process_id).await;
        self.report(ProcessStatus::Completed, tally, clock)
    }

    async fn persist(
        &self,
        process_id: &ProcessId,
        status: ProcessStatus,
        tally: &Tally,
        error: Option<String>,
    ) {
        let state = ProcessState {
            process_id: process_id.to_string(),
            last_processed_index: tally.last_index,
            processed_count: tally.processed,
            success_count: tally.successes,
            error_count: tally.failures,
            status,
            error,
            timestamp: chrono::Utc::now(),
        };
        self.checkpoints.save_state(&state).await;
    }

    fn report_progress(&self, tally: &Tally, total: usize, current_batch: u64, total_batches: u64) {
        let percent = ProgressUpdate::percent_of(tally.processed, total as u64);
        self.reporter.report(
            tally.processed,
            total as u64,
            format!(
                "batch {current_batch}/{total_batches}: {}/{total} ({percent}%)",
                tally.processed
            ),
            current_batch,
            total_batches,
        );
    }

    fn report(&self, status: ProcessStatus, tally: &Tally, clock: &ExecutionClock) -> BatchReport {
        BatchReport {
            status,
            processed_count: tally.processed,
            success_count: tally.successes,
            error_count: tally.failures,
            elapsed: clock.elapsed(),
        }
    }
}

/// Best-effort extraction of a panic payload message
fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

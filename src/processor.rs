//! Item processor contract
//!
//! The engine invokes one processor per work item, strictly in input order.
//! An explicit failure ([`ItemOutcome::Failed`]) and a returned error are
//! both tallied as item failures and never abort the batch; the propagating
//! error channel is reserved for engine-level setup problems.
//!
//! Processors invoked after a resume may see items that already succeeded
//! in an earlier invocation (a checkpoint write can be lost or stale), so
//! they are required to be idempotent or side-effect-safe per item.

use crate::error::Result;
use async_trait::async_trait;

/// Outcome reported by an item processor
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Item handled successfully
    Success,
    /// Item failed; the detail is logged with the item index
    Failed(String),
}

/// Unit of work logic invoked once per item by the engine
///
/// Internal concurrency (fan-out network calls, retries via
/// [`retry_with_backoff`](crate::retry::retry_with_backoff)) belongs here;
/// the engine itself processes items one at a time.
#[async_trait]
pub trait ItemProcessor<T: Send + Sync>: Send + Sync {
    /// Process `item`, which sits at `index` within `items`
    ///
    /// `Err` is equivalent to `Ok(ItemOutcome::Failed)` from the engine's
    /// point of view; return whichever reads better at the call site.
    async fn process(&self, item: &T, index: usize, items: &[T]) -> Result<ItemOutcome>;
}

/// Adapter turning a plain closure into an [`ItemProcessor`]
///
/// Handy for tests and callers whose per-item work is synchronous.
pub struct FnProcessor<F> {
    f: F,
}

impl<F> FnProcessor<F> {
    /// Wrap a closure of `(item, index) -> Result<ItemOutcome>`
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<T, F> ItemProcessor<T> for FnProcessor<F>
where
    T: Send + Sync,
    F: Fn(&T, usize) -> Result<ItemOutcome> + Send + Sync,
{
    async fn process(&self, item: &T, index: usize, _items: &[T]) -> Result<ItemOutcome> {
        (self.f)(item, index)
    }
}

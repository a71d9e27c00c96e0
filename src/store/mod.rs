//! Durable key-value state for checkpoints and the cancellation flag
//!
//! The engine never reaches for ambient global state: it is handed a
//! [`StateStore`] capability and talks to it through [`Checkpoints`], which
//! owns the key namespace, the JSON encoding of [`ProcessState`], and the
//! swallow-and-log failure policy. Checkpoint loss only costs a
//! restart-from-zero, never correctness, so store failures are logged and
//! the run continues in memory.
//!
//! ## Implementations
//!
//! - [`MemoryStore`]: in-process `HashMap`, for tests and ephemeral runs
//! - [`SqliteStore`]: durable SQLite-backed store for production

use crate::error::{Result, StoreError};
use crate::types::{ProcessId, ProcessState};
use async_trait::async_trait;
use std::sync::Arc;

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Key prefix for per-run checkpoint records
const STATE_KEY_PREFIX: &str = "batch_state_";

/// Well-known global key for the cooperative cancellation flag
///
/// Deliberately not namespaced by process id so a control path can request
/// cancellation without knowing which run is active.
const CANCEL_FLAG_KEY: &str = "cancel_requested";

/// Durable key-value store surviving across engine invocations
///
/// A missing key is `Ok(None)`, never an error. Values are opaque strings;
/// serialization lives in [`Checkpoints`].
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Store `value` under `key`, overwriting any previous value
    async fn put(&self, key: &str, value: &str) -> std::result::Result<(), StoreError>;

    /// Fetch the value under `key`, or `None` if absent
    async fn get(&self, key: &str) -> std::result::Result<Option<String>, StoreError>;

    /// Remove the value under `key` (removing an absent key is not an error)
    async fn remove(&self, key: &str) -> std::result::Result<(), StoreError>;
}

/// Checkpoint persistence over a [`StateStore`]
///
/// Save failures are logged and ignored; load failures (store or JSON) are
/// logged and treated as absent.
#[derive(Clone)]
pub struct Checkpoints {
    store: Arc<dyn StateStore>,
}

impl Checkpoints {
    /// Wrap a state store
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    fn state_key(process_id: &ProcessId) -> String {
        format!("{STATE_KEY_PREFIX}{process_id}")
    }

    /// Persist a checkpoint, best-effort
    pub async fn save_state(&self, state: &ProcessState) {
        let key = format!("{STATE_KEY_PREFIX}{}", state.process_id);
        let json = match serde_json::to_string(state) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(process_id = %state.process_id, error = %e, "Failed to serialize checkpoint");
                return;
            }
        };
        if let Err(e) = self.store.put(&key, &json).await {
            tracing::error!(process_id = %state.process_id, error = %e, "Failed to save checkpoint");
        }
    }

    /// Load the checkpoint for `process_id`, treating failures as absent
    pub async fn load_state(&self, process_id: &ProcessId) -> Option<ProcessState> {
        let key = Self::state_key(process_id);
        let json = match self.store.get(&key).await {
            Ok(json) => json?,
            Err(e) => {
                tracing::error!(process_id = %process_id, error = %e, "Failed to load checkpoint");
                return None;
            }
        };
        match serde_json::from_str(&json) {
            Ok(state) => Some(state),
            Err(e) => {
                tracing::error!(process_id = %process_id, error = %e, "Failed to parse checkpoint, treating as absent");
                None
            }
        }
    }

    /// Delete the checkpoint for `process_id`, best-effort
    pub async fn clear_state(&self, process_id: &ProcessId) {
        if let Err(e) = self.store.remove(&Self::state_key(process_id)).await {
            tracing::error!(process_id = %process_id, error = %e, "Failed to clear checkpoint");
        } else {
            tracing::debug!(process_id = %process_id, "Checkpoint cleared");
        }
    }

    /// Set the global cancellation flag
    ///
    /// Called from a control path separate from the running engine. The
    /// engine observes the flag at chunk boundaries.
    pub async fn request_cancel(&self) -> Result<()> {
        self.store.put(CANCEL_FLAG_KEY, "true").await?;
        Ok(())
    }

    /// Clear the global cancellation flag
    pub async fn reset_cancel(&self) -> Result<()> {
        self.store.remove(CANCEL_FLAG_KEY).await?;
        Ok(())
    }

    /// Whether cancellation has been requested
    ///
    /// Read failures are logged and treated as not-cancelled so a flaky
    /// store cannot abort an otherwise healthy run.
    pub async fn cancel_requested(&self) -> bool {
        match self.store.get(CANCEL_FLAG_KEY).await {
            Ok(value) => value.as_deref() == Some("true"),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read cancellation flag");
                false
            }
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProcessStatus;
    use chrono::Utc;

    fn sample_state(id: &str) -> ProcessState {
        ProcessState {
            process_id: id.to_string(),
            last_processed_index: 9,
            processed_count: 10,
            success_count: 8,
            error_count: 2,
            status: ProcessStatus::Processing,
            error: None,
            timestamp: Utc::now(),
        }
    }

    /// Store whose every operation fails, for exercising the swallow policy.
    struct BrokenStore;

    #[async_trait]
    impl StateStore for BrokenStore {
        async fn put(&self, _key: &str, _value: &str) -> std::result::Result<(), StoreError> {
            Err(StoreError::QueryFailed("store offline".to_string()))
        }

        async fn get(&self, _key: &str) -> std::result::Result<Option<String>, StoreError> {
            Err(StoreError::QueryFailed("store offline".to_string()))
        }

        async fn remove(&self, _key: &str) -> std::result::Result<(), StoreError> {
            Err(StoreError::QueryFailed("store offline".to_string()))
        }
    }

    #[tokio::test]
    async fn save_load_clear_round_trip() {
        let checkpoints = Checkpoints::new(Arc::new(MemoryStore::new()));
        let id = ProcessId::from("run1");

        assert!(checkpoints.load_state(&id).await.is_none());

        let state = sample_state("run1");
        checkpoints.save_state(&state).await;
        let loaded = checkpoints.load_state(&id).await.unwrap();
        assert_eq!(loaded, state);

        checkpoints.clear_state(&id).await;
        assert!(checkpoints.load_state(&id).await.is_none());
    }

    #[tokio::test]
    async fn checkpoints_are_namespaced_by_process_id() {
        let checkpoints = Checkpoints::new(Arc::new(MemoryStore::new()));
        checkpoints.save_state(&sample_state("a")).await;

        assert!(checkpoints.load_state(&ProcessId::from("a")).await.is_some());
        assert!(checkpoints.load_state(&ProcessId::from("b")).await.is_none());
    }

    #[tokio::test]
    async fn checkpoint_key_uses_contractual_prefix() {
        let store = Arc::new(MemoryStore::new());
        let checkpoints = Checkpoints::new(Arc::clone(&store) as Arc<dyn StateStore>);
        checkpoints.save_state(&sample_state("run1")).await;

        assert!(store.get("batch_state_run1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn corrupt_checkpoint_is_treated_as_absent() {
        let store = Arc::new(MemoryStore::new());
        store.put("batch_state_run1", "{not json").await.unwrap();

        let checkpoints = Checkpoints::new(store);
        assert!(checkpoints.load_state(&ProcessId::from("run1")).await.is_none());
    }

    #[tokio::test]
    async fn broken_store_never_propagates_from_checkpoint_paths() {
        let checkpoints = Checkpoints::new(Arc::new(BrokenStore));
        let id = ProcessId::from("run1");

        // None of these may panic or error
        checkpoints.save_state(&sample_state("run1")).await;
        assert!(checkpoints.load_state(&id).await.is_none());
        checkpoints.clear_state(&id).await;
        assert!(!checkpoints.cancel_requested().await);
    }

    #[tokio::test]
    async fn cancel_flag_set_and_reset() {
        let checkpoints = Checkpoints::new(Arc::new(MemoryStore::new()));

        assert!(!checkpoints.cancel_requested().await);
        checkpoints.request_cancel().await.unwrap();
        assert!(checkpoints.cancel_requested().await);
        checkpoints.reset_cancel().await.unwrap();
        assert!(!checkpoints.cancel_requested().await);
    }

    #[tokio::test]
    async fn cancel_flag_is_global_across_process_ids() {
        let store = Arc::new(MemoryStore::new());
        let checkpoints = Checkpoints::new(Arc::clone(&store) as Arc<dyn StateStore>);
        checkpoints.request_cancel().await.unwrap();

        // The flag lives under a well-known key, independent of any run
        assert_eq!(
            store.get("cancel_requested").await.unwrap().as_deref(),
            Some("true")
        );
    }

    #[tokio::test]
    async fn request_cancel_surfaces_store_errors() {
        let checkpoints = Checkpoints::new(Arc::new(BrokenStore));
        assert!(checkpoints.request_cancel().await.is_err());
        assert!(checkpoints.reset_cancel().await.is_err());
    }
}

//! SQLite-backed durable state store.

use crate::error::StoreError;
use async_trait::async_trait;
use sqlx::SqliteConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool};
use std::path::Path;
use std::str::FromStr;

use super::StateStore;

/// Durable [`StateStore`] backed by a SQLite database
///
/// Writes are single-row upserts, so checkpoint records are last-write-wins
/// and never partially visible.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and run migrations
    pub async fn new(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                StoreError::ConnectionFailed(format!("Failed to create database directory: {e}"))
            })?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .map_err(|e| {
                StoreError::ConnectionFailed(format!("Failed to parse database path: {e}"))
            })?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePool::connect_with(options).await.map_err(|e| {
            StoreError::ConnectionFailed(format!("Failed to connect to database: {e}"))
        })?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await.map_err(|e| {
            StoreError::ConnectionFailed(format!("Failed to acquire connection: {e}"))
        })?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY,
                applied_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            StoreError::MigrationFailed(format!("Failed to create schema_version table: {e}"))
        })?;

        let current_version: Option<i64> =
            sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
                .fetch_optional(&mut *conn)
                .await
                .map_err(|e| {
                    StoreError::MigrationFailed(format!("Failed to query schema version: {e}"))
                })?
                .flatten();

        if current_version.unwrap_or(0) < 1 {
            Self::migrate_v1(&mut conn).await?;
        }

        Ok(())
    }

    /// Migration v1: key-value table for checkpoints and control flags
    async fn migrate_v1(conn: &mut SqliteConnection) -> Result<(), StoreError> {
        tracing::info!("Applying state store migration v1");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS batch_state (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            StoreError::MigrationFailed(format!("Failed to create batch_state table: {e}"))
        })?;

        sqlx::query("INSERT INTO schema_version (version, applied_at) VALUES (1, ?)")
            .bind(chrono::Utc::now().timestamp())
            .execute(&mut *conn)
            .await
            .map_err(|e| {
                StoreError::MigrationFailed(format!("Failed to record migration v1: {e}"))
            })?;

        Ok(())
    }
}

#[async_trait]
impl StateStore for SqliteStore {
    async fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO batch_state (key, value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("Failed to write state for {key}: {e}")))?;

        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        sqlx::query_scalar("SELECT value FROM batch_state WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("Failed to read state for {key}: {e}")))
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM batch_state WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("Failed to delete state for {key}: {e}")))?;

        Ok(())
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    async fn temp_store() -> (SqliteStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::new(&dir.path().join("state.db")).await.unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn put_get_remove_round_trip() {
        let (store, _dir) = temp_store().await;

        assert_eq!(store.get("k").await.unwrap(), None);
        store.put("k", "v").await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
        store.put("k", "v2").await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v2"));
        store.remove("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn values_survive_reopening_the_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.db");

        {
            let store = SqliteStore::new(&path).await.unwrap();
            store.put("k", "persisted").await.unwrap();
        }

        let reopened = SqliteStore::new(&path).await.unwrap();
        assert_eq!(
            reopened.get("k").await.unwrap().as_deref(),
            Some("persisted")
        );
    }

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.db");

        let first = SqliteStore::new(&path).await.unwrap();
        drop(first);
        // Reopening must not attempt to re-apply v1
        let second = SqliteStore::new(&path).await.unwrap();
        second.put("k", "v").await.unwrap();
        assert_eq!(second.get("k").await.unwrap().as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn creates_missing_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b").join("state.db");
        let store = SqliteStore::new(&nested).await.unwrap();
        store.put("k", "v").await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
    }
}

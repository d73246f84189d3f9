//! Local key-value store.
//!
//! `KeyValueStore` is the durable string storage every other component
//! persists through. Values are opaque strings (callers serialise JSON
//! themselves). Two backends are provided:
//!
//! - [`SqliteStore`]: rows in the `kv_store` table (see [`crate::db`]).
//! - [`MemoryStore`]: a `HashMap` behind an `RwLock`, used by tests and
//!   throwaway runs.
//!
//! Three logical namespaces live in the store; each is owned by exactly one
//! component: [`APP_CONFIG_KEY`] (settings), [`FASTING_DATA_KEY`] (tracker)
//! and [`CACHE_KEY`] (cache layer).

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use thiserror::Error;
use tokio::sync::RwLock;

/// Store key holding the serialised [`crate::settings::AppSettings`].
pub const APP_CONFIG_KEY: &str = "app_config";
/// Store key holding the serialised fasting record.
pub const FASTING_DATA_KEY: &str = "puasa_ayyamul_bidh";
/// Store key holding the whole cache blob.
pub const CACHE_KEY: &str = "cache";

/// Every key the application writes. Used by [`clear_app_data`].
pub const APP_KEYS: &[&str] = &[APP_CONFIG_KEY, FASTING_DATA_KEY, CACHE_KEY];

/// Errors raised by store backends.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Durable string storage.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Replace the value stored under `key`.
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Delete `key`. Deleting a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// Remove every application namespace from `store`.
pub async fn clear_app_data(store: &dyn KeyValueStore) -> Result<(), StoreError> {
    for key in APP_KEYS {
        store.remove(key).await?;
    }
    Ok(())
}

/// SQLite-backed store.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM kv_store WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|(value,)| value))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO kv_store (key, value, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM kv_store WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently held.
    pub async fn len(&self) -> usize {
        self.data.read().await.len()
    }

    /// `true` when no key is held.
    pub async fn is_empty(&self) -> bool {
        self.data.read().await.is_empty()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.data.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.data
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.data.write().await.remove(key);
        Ok(())
    }
}

//! Timestamped cache over the local key-value store.
//!
//! Every cached payload lives in one JSON object stored under
//! [`CACHE_KEY`], keyed by cache key, each entry stamped with the time it was
//! written. `CacheLayer` keeps an in-memory mirror of that object behind a
//! mutex; every mutation snapshots the mirror while still holding the lock
//! and hands the serialised blob to a single writer task. Persistence
//! therefore happens in mutation order and a read-modify-write is never
//! interleaved with another one, whatever thread the callers run on.
//!
//! `get` ignores staleness on purpose: callers check [`CacheLayer::is_valid`]
//! when they need fresh data and fall back to whatever is stored when the
//! network is unavailable.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::store::{KeyValueStore, StoreError, CACHE_KEY};

/// A single cached payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub payload: Value,
    /// Epoch milliseconds of the last write. Missing for entries written by
    /// something other than this layer; such entries are never valid.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stored_at_ms: Option<i64>,
}

enum PersistCommand {
    Write(String),
    Remove,
    Flush(oneshot::Sender<()>),
}

struct CacheInner {
    entries: Mutex<HashMap<String, CacheEntry>>,
    writer: mpsc::UnboundedSender<PersistCommand>,
}

/// Shared handle to the cache. Cloning is cheap; all clones see the same
/// entries and the same writer task.
#[derive(Clone)]
pub struct CacheLayer {
    inner: Arc<CacheInner>,
}

impl CacheLayer {
    /// Load the cache blob from `store` and start the writer task.
    ///
    /// A blob that cannot be parsed is discarded and the cache starts empty.
    /// Must be called from within a tokio runtime.
    pub async fn load(store: Arc<dyn KeyValueStore>) -> Result<Self, StoreError> {
        let entries = match store.get(CACHE_KEY).await? {
            Some(blob) => parse_blob(&blob),
            None => HashMap::new(),
        };

        tracing::debug!("Cache loaded with {} entries", entries.len());

        let (writer, commands) = mpsc::unbounded_channel();
        tokio::spawn(run_writer(store, commands));

        Ok(Self {
            inner: Arc::new(CacheInner {
                entries: Mutex::new(entries),
                writer,
            }),
        })
    }

    /// Raw payload for `key`, fresh or not.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.lock().get(key).map(|entry| entry.payload.clone())
    }

    /// Payload for `key` deserialised as `T`. A payload of the wrong shape is
    /// treated as absent.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let payload = self.get(key)?;
        match serde_json::from_value(payload) {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::debug!("Ignoring cache entry {} of unexpected shape: {}", key, err);
                None
            }
        }
    }

    /// Store `payload` under `key`, replacing any previous entry.
    pub fn put(&self, key: &str, payload: Value) {
        let mut entries = self.lock();
        let now = now_ms();

        // Never move a key's stamp backwards, even if the wall clock does.
        let stored_at = match entries.get(key).and_then(|entry| entry.stored_at_ms) {
            Some(previous) if previous > now => previous,
            _ => now,
        };

        entries.insert(
            key.to_string(),
            CacheEntry {
                payload,
                stored_at_ms: Some(stored_at),
            },
        );

        self.persist(&entries);
    }

    /// Serialise `value` and store it under `key`.
    pub fn put_as<T: Serialize>(&self, key: &str, value: &T) -> Result<(), serde_json::Error> {
        let payload = serde_json::to_value(value)?;
        self.put(key, payload);
        Ok(())
    }

    /// `true` when `key` has a timestamped entry younger than `max_age`.
    pub fn is_valid(&self, key: &str, max_age: Duration) -> bool {
        self.is_valid_at(key, max_age, now_ms())
    }

    /// [`is_valid`](Self::is_valid) evaluated at `now_ms` instead of the
    /// current time.
    pub fn is_valid_at(&self, key: &str, max_age: Duration, now_ms: i64) -> bool {
        let Some(stored_at) = self.stored_at(key) else {
            return false;
        };

        let age_ms = i128::from(now_ms) - i128::from(stored_at);
        age_ms < max_age.as_millis() as i128
    }

    /// Epoch milliseconds at which `key` was last written.
    pub fn stored_at(&self, key: &str) -> Option<i64> {
        self.lock().get(key).and_then(|entry| entry.stored_at_ms)
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// `true` when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drop every entry and remove the blob from the store.
    pub fn reset(&self) {
        let mut entries = self.lock();
        entries.clear();
        self.send(PersistCommand::Remove);
    }

    /// Wait until every write issued before this call has reached the store.
    pub async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        self.send(PersistCommand::Flush(ack));
        // The writer only goes away together with the last handle.
        let _ = done.await;
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.inner
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, entries: &HashMap<String, CacheEntry>) {
        match serde_json::to_string(entries) {
            Ok(blob) => self.send(PersistCommand::Write(blob)),
            Err(err) => tracing::error!("Failed to serialise cache blob: {}", err),
        }
    }

    fn send(&self, command: PersistCommand) {
        if self.inner.writer.send(command).is_err() {
            tracing::error!("Cache writer task is gone; change not persisted");
        }
    }
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn parse_blob(blob: &str) -> HashMap<String, CacheEntry> {
    let object: serde_json::Map<String, Value> = match serde_json::from_str(blob) {
        Ok(object) => object,
        Err(err) => {
            tracing::warn!("Discarding unreadable cache blob: {}", err);
            return HashMap::new();
        }
    };

    object
        .into_iter()
        .filter_map(|(key, raw)| match serde_json::from_value::<CacheEntry>(raw) {
            Ok(entry) => Some((key, entry)),
            Err(err) => {
                tracing::debug!("Dropping malformed cache entry {}: {}", key, err);
                None
            }
        })
        .collect()
}

async fn run_writer(
    store: Arc<dyn KeyValueStore>,
    mut commands: mpsc::UnboundedReceiver<PersistCommand>,
) {
    while let Some(command) = commands.recv().await {
        match command {
            PersistCommand::Write(blob) => {
                if let Err(err) = store.set(CACHE_KEY, &blob).await {
                    tracing::error!("Failed to persist cache: {}", err);
                }
            }
            PersistCommand::Remove => {
                if let Err(err) = store.remove(CACHE_KEY).await {
                    tracing::error!("Failed to remove cache blob: {}", err);
                }
            }
            PersistCommand::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use proptest::prelude::*;
    use serde_json::json;

    async fn empty_cache() -> (CacheLayer, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let cache = CacheLayer::load(store.clone()).await.unwrap();
        (cache, store)
    }

    // ---- get / put ----

    #[tokio::test]
    async fn get_returns_none_when_cache_is_empty() {
        let (cache, _) = empty_cache().await;
        assert!(cache.get("hijri_01-01-2024").is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn put_then_get_returns_payload() {
        let (cache, _) = empty_cache().await;
        let payload = json!({ "day": 14, "month": 9 });

        cache.put("hijri_24-03-2024", payload.clone());

        assert_eq!(cache.get("hijri_24-03-2024"), Some(payload));
    }

    #[tokio::test]
    async fn put_replaces_previous_payload() {
        let (cache, _) = empty_cache().await;
        cache.put("k", json!(1));
        cache.put("k", json!(2));

        assert_eq!(cache.get("k"), Some(json!(2)));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn get_as_returns_none_for_wrong_shape() {
        let (cache, _) = empty_cache().await;
        cache.put("k", json!("not a number"));

        assert_eq!(cache.get_as::<u32>("k"), None);
        assert_eq!(cache.get_as::<String>("k").as_deref(), Some("not a number"));
    }

    // ---- is_valid ----

    #[tokio::test]
    async fn is_valid_is_false_for_missing_key() {
        let (cache, _) = empty_cache().await;
        assert!(!cache.is_valid("missing", Duration::from_secs(60)));
    }

    #[tokio::test]
    async fn is_valid_is_true_right_after_put() {
        let (cache, _) = empty_cache().await;
        cache.put("k", json!(true));
        assert!(cache.is_valid("k", Duration::from_secs(60)));
    }

    #[tokio::test]
    async fn is_valid_becomes_false_exactly_at_max_age() {
        let (cache, _) = empty_cache().await;
        cache.put("k", json!(true));
        let stored_at = cache.stored_at("k").unwrap();
        let max_age = Duration::from_millis(1_000);

        assert!(cache.is_valid_at("k", max_age, stored_at + 999));
        assert!(!cache.is_valid_at("k", max_age, stored_at + 1_000));
        assert!(!cache.is_valid_at("k", max_age, stored_at + 5_000));
    }

    #[tokio::test]
    async fn stale_entry_is_still_returned_by_get() {
        let (cache, _) = empty_cache().await;
        cache.put("k", json!("old"));
        let stored_at = cache.stored_at("k").unwrap();

        assert!(!cache.is_valid_at("k", Duration::from_millis(10), stored_at + 60_000));
        assert_eq!(cache.get("k"), Some(json!("old")));
    }

    #[tokio::test]
    async fn stamp_never_moves_backwards() {
        let (cache, _) = empty_cache().await;
        cache.put("k", json!(1));
        let first = cache.stored_at("k").unwrap();
        cache.put("k", json!(2));

        assert!(cache.stored_at("k").unwrap() >= first);
    }

    // ---- persistence ----

    #[tokio::test]
    async fn flushed_entries_survive_reload() {
        let (cache, store) = empty_cache().await;
        cache.put("a", json!({ "x": 1 }));
        cache.put("b", json!([1, 2, 3]));
        cache.flush().await;

        let reloaded = CacheLayer::load(store).await.unwrap();

        assert_eq!(reloaded.get("a"), Some(json!({ "x": 1 })));
        assert_eq!(reloaded.get("b"), Some(json!([1, 2, 3])));
        assert_eq!(reloaded.stored_at("a"), cache.stored_at("a"));
    }

    #[tokio::test]
    async fn unreadable_blob_starts_empty_cache() {
        let store = Arc::new(MemoryStore::new());
        store.set(CACHE_KEY, "{not json").await.unwrap();

        let cache = CacheLayer::load(store).await.unwrap();

        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn entry_without_timestamp_is_readable_but_never_valid() {
        let store = Arc::new(MemoryStore::new());
        store
            .set(CACHE_KEY, r#"{"legacy": {"payload": "kept"}, "broken": 5}"#)
            .await
            .unwrap();

        let cache = CacheLayer::load(store).await.unwrap();

        assert_eq!(cache.get("legacy"), Some(json!("kept")));
        assert!(!cache.is_valid("legacy", Duration::from_secs(3600)));
        assert!(cache.get("broken").is_none());
    }

    #[tokio::test]
    async fn reset_clears_entries_and_store() {
        let (cache, store) = empty_cache().await;
        cache.put("k", json!(1));
        cache.flush().await;
        assert!(store.get(CACHE_KEY).await.unwrap().is_some());

        cache.reset();
        cache.flush().await;

        assert!(cache.is_empty());
        assert!(store.get(CACHE_KEY).await.unwrap().is_none());
    }

    // ---- properties ----

    fn json_value() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::from),
            any::<i64>().prop_map(Value::from),
            "[a-zA-Z0-9 ]{0,12}".prop_map(Value::from),
        ];

        leaf.prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::hash_map("[a-z]{1,6}", inner, 0..4)
                    .prop_map(|map| Value::Object(map.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn put_then_get_is_deep_equal(key in "[a-z_0-9-]{1,20}", payload in json_value()) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();

            let read_back = runtime.block_on(async {
                let (cache, _) = empty_cache().await;
                cache.put(&key, payload.clone());
                cache.get(&key)
            });

            prop_assert_eq!(read_back, Some(payload));
        }
    }
}

//! Cache Facade Module
//!
//! The typed front door: serde values in and out, one storage adapter
//! underneath, an event bus announcing what happened. Event emission lives
//! here rather than in the adapters, so adapters stay freely composable and
//! wrapping one never double-fires notifications.
//!
//! Events fire only after the underlying operation succeeded. Misses are
//! silent; a lookup that discovers an expired entry fires `Expired` instead
//! of `Get`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::adapters::{FileAdapter, Lookup, MemoryAdapter, StorageAdapter};
use crate::cache::CacheStats;
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::events::{CacheEvent, CacheEventKind, EventBus, ListenerId};

// == Cache ==

/// Cache over a pluggable storage backend.
///
/// Cloning is cheap and clones share everything: the backend, the counters,
/// and the registered listeners.
///
/// # Example
///
/// ```
/// use keystash::{Cache, CacheConfig};
///
/// # tokio_test::block_on(async {
/// let cache = Cache::in_memory(CacheConfig::new().with_max_entries(256));
///
/// cache.set("greeting", "hello").await.unwrap();
/// let value: Option<String> = cache.get("greeting").await.unwrap();
/// assert_eq!(value.as_deref(), Some("hello"));
/// # });
/// ```
#[derive(Clone)]
pub struct Cache {
    adapter: Arc<dyn StorageAdapter>,
    events: Arc<EventBus>,
}

impl Cache {
    /// Wraps any storage adapter.
    pub fn new(adapter: Arc<dyn StorageAdapter>) -> Self {
        Self {
            adapter,
            events: Arc::new(EventBus::new()),
        }
    }

    /// Volatile in-process cache.
    pub fn in_memory(config: CacheConfig) -> Self {
        Self::new(Arc::new(MemoryAdapter::new(config)))
    }

    /// Persistent cache storing one file per entry under `directory`.
    pub fn on_disk(directory: impl Into<PathBuf>, config: CacheConfig) -> Self {
        Self::new(Arc::new(FileAdapter::new(directory, config)))
    }

    fn emit(&self, kind: CacheEventKind, key: Option<&str>) {
        self.events
            .emit(&CacheEvent::new(kind, key.map(str::to_string)));
    }

    /// Adapter lookup plus the read-side event protocol.
    async fn lookup(&self, key: &str) -> Result<Lookup> {
        let lookup = self.adapter.get(key).await?;
        match &lookup {
            Lookup::Hit(_) => self.emit(CacheEventKind::Get, Some(key)),
            Lookup::Expired => self.emit(CacheEventKind::Expired, Some(key)),
            Lookup::Miss => {}
        }
        Ok(lookup)
    }

    /// Fetches and deserializes the value stored under `key`.
    ///
    /// Returns `Ok(None)` for missing and expired entries alike. A stored
    /// value that does not fit `T` is a [`CacheError::Codec`], since the
    /// data itself is intact.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.lookup(key).await?.into_value() {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| CacheError::codec(format!("key '{key}'"), e)),
            None => Ok(None),
        }
    }

    /// Fetches the raw JSON value stored under `key`.
    pub async fn get_value(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.lookup(key).await?.into_value())
    }

    /// Stores a value under `key` with the backend's default TTL.
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        self.set_inner(key, value, None).await
    }

    /// Stores a value under `key` with an explicit lifetime.
    pub async fn set_with_ttl<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<()> {
        self.set_inner(key, value, Some(ttl)).await
    }

    async fn set_inner<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let value = serde_json::to_value(value)
            .map_err(|e| CacheError::codec(format!("key '{key}'"), e))?;
        self.adapter.set(key, value, ttl).await?;
        self.emit(CacheEventKind::Set, Some(key));
        Ok(())
    }

    /// Removes `key`. Fires `Delete` whether or not the key existed.
    pub async fn delete(&self, key: &str) -> Result<()> {
        self.adapter.delete(key).await?;
        self.emit(CacheEventKind::Delete, Some(key));
        Ok(())
    }

    /// Empties the cache's namespace and fires `Clear`.
    pub async fn clear(&self) -> Result<()> {
        self.adapter.clear().await?;
        self.emit(CacheEventKind::Clear, None);
        Ok(())
    }

    /// Checks for a live value. Counts as a read: it renews recency and
    /// fires the same events a `get` would.
    pub async fn has(&self, key: &str) -> Result<bool> {
        Ok(self.lookup(key).await?.is_hit())
    }

    /// Sweeps expired entries out of the backend, returning how many were
    /// removed.
    pub async fn cleanup_expired(&self) -> Result<usize> {
        self.adapter.cleanup_expired().await
    }

    /// Number of entries currently stored.
    pub async fn len(&self) -> Result<usize> {
        self.adapter.len().await
    }

    /// Snapshot of the backend's hit/miss/eviction/expiration counters.
    pub fn stats(&self) -> CacheStats {
        self.adapter.stats()
    }

    /// Registers a listener for one kind of cache event.
    pub fn on<F>(&self, kind: CacheEventKind, listener: F) -> ListenerId
    where
        F: Fn(&CacheEvent) + Send + Sync + 'static,
    {
        self.events.on(kind, listener)
    }

    /// Unregisters a listener. Returns whether anything was removed.
    pub fn off(&self, kind: CacheEventKind, id: ListenerId) -> bool {
        self.events.off(kind, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Session {
        user: String,
        visits: u32,
    }

    #[tokio::test]
    async fn test_typed_roundtrip() {
        let cache = Cache::in_memory(CacheConfig::new());
        let session = Session {
            user: "ada".to_string(),
            visits: 3,
        };

        cache.set("session:1", &session).await.unwrap();

        let loaded: Option<Session> = cache.get("session:1").await.unwrap();
        assert_eq!(loaded, Some(session));
    }

    #[tokio::test]
    async fn test_get_missing_key_is_none() {
        let cache = Cache::in_memory(CacheConfig::new());
        let loaded: Option<String> = cache.get("absent").await.unwrap();
        assert_eq!(loaded, None);
    }

    #[tokio::test]
    async fn test_type_mismatch_is_a_codec_error() {
        let cache = Cache::in_memory(CacheConfig::new());
        cache.set("n", &42u32).await.unwrap();

        let loaded: Result<Option<Vec<String>>> = cache.get("n").await;
        assert!(matches!(loaded, Err(CacheError::Codec { .. })));
    }

    #[tokio::test]
    async fn test_set_and_get_fire_events() {
        let cache = Cache::in_memory(CacheConfig::new());
        let log = Arc::new(Mutex::new(Vec::new()));

        for kind in [CacheEventKind::Set, CacheEventKind::Get] {
            let log_clone = Arc::clone(&log);
            cache.on(kind, move |event| {
                log_clone.lock().unwrap().push((event.kind, event.key.clone()));
            });
        }

        cache.set("k", "v").await.unwrap();
        let _: Option<String> = cache.get("k").await.unwrap();

        let log = log.lock().unwrap();
        assert_eq!(
            log.as_slice(),
            &[
                (CacheEventKind::Set, Some("k".to_string())),
                (CacheEventKind::Get, Some("k".to_string())),
            ]
        );
    }

    #[tokio::test]
    async fn test_miss_fires_no_event() {
        let cache = Cache::in_memory(CacheConfig::new());
        let fired = Arc::new(AtomicUsize::new(0));

        for kind in [
            CacheEventKind::Set,
            CacheEventKind::Get,
            CacheEventKind::Delete,
            CacheEventKind::Clear,
            CacheEventKind::Expired,
        ] {
            let fired_clone = Arc::clone(&fired);
            cache.on(kind, move |_| {
                fired_clone.fetch_add(1, Ordering::SeqCst);
            });
        }

        let _: Option<String> = cache.get("absent").await.unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_expired_lookup_fires_expired_not_get() {
        let cache = Cache::in_memory(CacheConfig::new());
        let log = Arc::new(Mutex::new(Vec::new()));

        for kind in [CacheEventKind::Get, CacheEventKind::Expired] {
            let log_clone = Arc::clone(&log);
            cache.on(kind, move |event| {
                log_clone.lock().unwrap().push(event.kind);
            });
        }

        cache
            .set_with_ttl("fleeting", "v", Duration::from_millis(20))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let loaded: Option<String> = cache.get("fleeting").await.unwrap();
        assert_eq!(loaded, None);
        assert_eq!(log.lock().unwrap().as_slice(), &[CacheEventKind::Expired]);
    }

    #[tokio::test]
    async fn test_delete_and_clear_fire_events() {
        let cache = Cache::in_memory(CacheConfig::new());
        let log = Arc::new(Mutex::new(Vec::new()));

        for kind in [CacheEventKind::Delete, CacheEventKind::Clear] {
            let log_clone = Arc::clone(&log);
            cache.on(kind, move |event| {
                log_clone.lock().unwrap().push((event.kind, event.key.clone()));
            });
        }

        cache.delete("ghost").await.unwrap();
        cache.clear().await.unwrap();

        let log = log.lock().unwrap();
        assert_eq!(
            log.as_slice(),
            &[
                (CacheEventKind::Delete, Some("ghost".to_string())),
                (CacheEventKind::Clear, None),
            ]
        );
    }

    #[tokio::test]
    async fn test_off_silences_listener() {
        let cache = Cache::in_memory(CacheConfig::new());
        let fired = Arc::new(AtomicUsize::new(0));

        let fired_clone = Arc::clone(&fired);
        let id = cache.on(CacheEventKind::Set, move |_| {
            fired_clone.fetch_add(1, Ordering::SeqCst);
        });

        cache.set("a", &1).await.unwrap();
        assert!(cache.off(CacheEventKind::Set, id));
        cache.set("b", &2).await.unwrap();

        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_clones_share_state_and_listeners() {
        let cache = Cache::in_memory(CacheConfig::new());
        let clone = cache.clone();
        let fired = Arc::new(AtomicUsize::new(0));

        let fired_clone = Arc::clone(&fired);
        cache.on(CacheEventKind::Set, move |_| {
            fired_clone.fetch_add(1, Ordering::SeqCst);
        });

        clone.set("k", "v").await.unwrap();

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        let loaded: Option<String> = cache.get("k").await.unwrap();
        assert_eq!(loaded.as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn test_stats_surface_through_facade() {
        let cache = Cache::in_memory(CacheConfig::new());
        cache.set("k", "v").await.unwrap();

        let _: Option<String> = cache.get("k").await.unwrap();
        let _: Option<String> = cache.get("absent").await.unwrap();

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);
    }
}

//! Key/Value Adapter Module
//!
//! Persistent backend over any synchronous string-keyed store (browser-style
//! local storage, an embedded KV file, a test double). Entries live under
//! `prefix + key`; recency order is persisted beside them as a JSON array of
//! keys under `prefix + __access_order`, oldest first.
//!
//! The store is shared and can fail on write (quota), so this adapter trusts
//! nothing: reads re-check TTLs, unreadable items are purged on sight, and a
//! failed write triggers one repair pass over the namespace before the write
//! is retried.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::adapters::{Lookup, RepairOutcome, StorageAdapter};
use crate::cache::{
    current_timestamp_ms, policy, AccessOrder, CacheEntry, CacheStats, EntryCodec, JsonCodec,
    StoredEntry, ACCESS_ORDER_KEY,
};
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};

// == Key/Value Store ==

/// A write rejected by the backing store, typically for lack of space.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct KvWriteError(pub String);

/// Minimal surface a string-keyed store must offer.
///
/// Reads and removals are infallible by contract; only `set_item` can be
/// refused. Implementations are expected to be cheap enough to call once or
/// twice per cache operation.
pub trait KeyValueStore: Send + Sync {
    /// Returns the raw string stored under `key`, if any.
    fn get_item(&self, key: &str) -> Option<String>;

    /// Stores `value` under `key`, replacing any previous value.
    fn set_item(&self, key: &str, value: &str) -> std::result::Result<(), KvWriteError>;

    /// Removes `key`. Removing an absent key is a no-op.
    fn remove_item(&self, key: &str);

    /// Every key currently stored, in no particular order.
    fn keys(&self) -> Vec<String>;
}

// == In-Memory Store ==

/// [`KeyValueStore`] backed by a process-local map, with an optional byte
/// quota so tests can provoke the same write failures a real store produces.
#[derive(Default)]
pub struct MemoryKvStore {
    items: Mutex<HashMap<String, String>>,
    capacity_bytes: Option<usize>,
}

impl MemoryKvStore {
    /// Unbounded store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store refusing writes once key + value bytes would exceed `limit`.
    pub fn with_capacity_bytes(limit: usize) -> Self {
        Self {
            items: Mutex::new(HashMap::new()),
            capacity_bytes: Some(limit),
        }
    }

    /// Current key + value byte usage.
    pub fn usage_bytes(&self) -> usize {
        let items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        Self::usage_of(&items)
    }

    fn usage_of(items: &HashMap<String, String>) -> usize {
        items.iter().map(|(k, v)| k.len() + v.len()).sum()
    }
}

impl KeyValueStore for MemoryKvStore {
    fn get_item(&self, key: &str) -> Option<String> {
        let items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        items.get(key).cloned()
    }

    fn set_item(&self, key: &str, value: &str) -> std::result::Result<(), KvWriteError> {
        let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(limit) = self.capacity_bytes {
            let replaced = items.get(key).map(|v| key.len() + v.len()).unwrap_or(0);
            let projected = Self::usage_of(&items) - replaced + key.len() + value.len();
            if projected > limit {
                return Err(KvWriteError(format!(
                    "quota of {} bytes exceeded ({} required)",
                    limit, projected
                )));
            }
        }
        items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) {
        let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        items.remove(key);
    }

    fn keys(&self) -> Vec<String> {
        let items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        items.keys().cloned().collect()
    }
}

// == Key/Value Adapter ==

/// Storage backend over a [`KeyValueStore`], namespaced by a key prefix.
///
/// The adapter keeps no in-process state beyond counters: entries and the
/// access-order document are re-read from the store on every operation, so
/// several adapters over the same store and prefix see each other's writes.
/// Concurrent writers race on the order document (last write wins); the
/// repair pass reconciles any drift.
pub struct KeyValueAdapter {
    store: Arc<dyn KeyValueStore>,
    prefix: String,
    config: CacheConfig,
    codec: Arc<dyn EntryCodec>,
    stats: Mutex<CacheStats>,
}

impl KeyValueAdapter {
    /// Creates an adapter writing under `prefix` with the default JSON codec.
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        prefix: impl Into<String>,
        config: CacheConfig,
    ) -> Self {
        Self {
            store,
            prefix: prefix.into(),
            config,
            codec: Arc::new(JsonCodec),
            stats: Mutex::new(CacheStats::new()),
        }
    }

    /// Swaps the entry codec, e.g. for a compressing or signing encoding.
    pub fn with_codec(mut self, codec: Arc<dyn EntryCodec>) -> Self {
        self.codec = codec;
        self
    }

    fn stats_mut(&self) -> std::sync::MutexGuard<'_, CacheStats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn storage_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    fn order_key(&self) -> String {
        format!("{}{}", self.prefix, ACCESS_ORDER_KEY)
    }

    /// Maps a raw store key back to the cache key it holds, skipping keys
    /// outside this namespace and the order document itself.
    fn cache_key<'a>(&self, storage_key: &'a str) -> Option<&'a str> {
        let key = storage_key.strip_prefix(&self.prefix)?;
        (key != ACCESS_ORDER_KEY).then_some(key)
    }

    // == Order Document ==

    /// Loads the persisted access order. Missing and unreadable documents both
    /// come back as `None`; a later repair rebuilds them from the entries.
    fn load_order(&self) -> Option<AccessOrder> {
        let raw = self.store.get_item(&self.order_key())?;
        match serde_json::from_str(&raw) {
            Ok(order) => Some(order),
            Err(e) => {
                warn!("Unreadable access-order document ({}); will rebuild", e);
                None
            }
        }
    }

    fn save_order(&self, order: &AccessOrder) -> std::result::Result<(), KvWriteError> {
        let raw = serde_json::to_string(order)
            .map_err(|e| KvWriteError(format!("order document encode failed: {e}")))?;
        self.store.set_item(&self.order_key(), &raw)
    }

    /// Re-orders `key` to most recent, persisting on a best-effort basis.
    /// Reads must not fail because the order write was refused.
    fn touch_in_order(&self, key: &str) {
        let mut order = self.load_order().unwrap_or_else(AccessOrder::new);
        order.touch(key);
        if let Err(e) = self.save_order(&order) {
            warn!("Recency update for '{}' not persisted: {}", key, e);
        }
    }

    /// Drops `key` from the persisted order, best-effort like a touch.
    fn forget_in_order(&self, key: &str) {
        let Some(mut order) = self.load_order() else {
            return;
        };
        if order.remove(key) {
            if let Err(e) = self.save_order(&order) {
                warn!("Order update after removing '{}' not persisted: {}", key, e);
            }
        }
    }

    // == Repair ==

    /// Walks the namespace, removing unreadable and expired entries from the
    /// store. Returns the surviving cache keys and how many were purged.
    fn scan_and_purge(&self, now_ms: u64) -> (Vec<String>, usize) {
        let mut survivors = Vec::new();
        let mut dropped = 0usize;

        for storage_key in self.store.keys() {
            let Some(key) = self.cache_key(&storage_key) else {
                continue;
            };
            let Some(raw) = self.store.get_item(&storage_key) else {
                continue;
            };
            match self.codec.decode(&raw) {
                Ok(stored) if stored.key != key => {
                    warn!("Entry under '{}' claims key '{}'; dropping", key, stored.key);
                    self.store.remove_item(&storage_key);
                    dropped += 1;
                }
                Ok(stored) if stored.is_expired_at(now_ms) => {
                    self.store.remove_item(&storage_key);
                    dropped += 1;
                }
                Ok(_) => survivors.push(key.to_string()),
                Err(e) => {
                    warn!("Dropping unreadable entry under '{}': {}", key, e);
                    self.store.remove_item(&storage_key);
                    dropped += 1;
                }
            }
        }

        (survivors, dropped)
    }

    /// Full namespace repair: purge dead entries, reconcile the order
    /// document against what actually survives, evict down to capacity, and
    /// persist the rebuilt order.
    ///
    /// A store that refuses even the rebuilt order document is out of room
    /// for good, which surfaces as [`CacheError::StorageFull`].
    fn repair(&self, now_ms: u64) -> Result<RepairOutcome> {
        let prior = self.load_order().unwrap_or_else(AccessOrder::new);
        let (survivors, dropped) = self.scan_and_purge(now_ms);

        let mut order = policy::reconcile_order(&prior, survivors.iter().map(String::as_str));
        let evicted_keys = policy::evict_overflow(&mut order, self.config.max_entries);
        for key in &evicted_keys {
            self.store.remove_item(&self.storage_key(key));
        }

        self.save_order(&order).map_err(|e| {
            CacheError::StorageFull(format!("order document rejected during repair: {e}"))
        })?;

        let evicted = evicted_keys.len();
        if dropped > 0 || evicted > 0 {
            let mut stats = self.stats_mut();
            stats.record_expirations(dropped as u64);
            for _ in 0..evicted {
                stats.record_eviction();
            }
            info!(
                "Repaired namespace '{}': dropped {}, evicted {}, tracking {}",
                self.prefix,
                dropped,
                evicted,
                order.len()
            );
        }

        Ok(RepairOutcome {
            order,
            dropped,
            evicted,
        })
    }
}

#[async_trait]
impl StorageAdapter for KeyValueAdapter {
    async fn get(&self, key: &str) -> Result<Lookup> {
        let storage_key = self.storage_key(key);
        let Some(raw) = self.store.get_item(&storage_key) else {
            self.stats_mut().record_miss();
            return Ok(Lookup::Miss);
        };

        let stored = match self.codec.decode(&raw) {
            Ok(stored) if stored.key == key => stored,
            Ok(stored) => {
                warn!("Entry under '{}' claims key '{}'; dropping", key, stored.key);
                self.store.remove_item(&storage_key);
                self.forget_in_order(key);
                let mut stats = self.stats_mut();
                stats.record_miss();
                stats.record_expirations(1);
                return Ok(Lookup::Miss);
            }
            Err(e) => {
                // Unreadable data degrades to a miss; the broken item goes away.
                warn!("Dropping unreadable entry for '{}': {}", key, e);
                self.store.remove_item(&storage_key);
                self.forget_in_order(key);
                let mut stats = self.stats_mut();
                stats.record_miss();
                stats.record_expirations(1);
                return Ok(Lookup::Miss);
            }
        };

        if stored.is_expired_at(current_timestamp_ms()) {
            self.store.remove_item(&storage_key);
            self.forget_in_order(key);
            let mut stats = self.stats_mut();
            stats.record_miss();
            stats.record_expirations(1);
            return Ok(Lookup::Expired);
        }

        self.touch_in_order(key);
        self.stats_mut().record_hit();
        Ok(Lookup::Hit(stored.entry.value))
    }

    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<()> {
        let now_ms = current_timestamp_ms();
        let entry = CacheEntry::new(value, policy::effective_ttl(ttl, &self.config));
        let raw = self.codec.encode(&StoredEntry::new(key, entry))?;
        let storage_key = self.storage_key(key);

        let mut order = self.load_order().unwrap_or_else(AccessOrder::new);
        if policy::needs_eviction(order.len(), order.contains(key), self.config.max_entries) {
            // Expired entries may be holding the slot; purge before evicting.
            order = self.repair(now_ms)?.order;
            if policy::needs_eviction(order.len(), order.contains(key), self.config.max_entries) {
                if let Some(victim) = order.evict_oldest() {
                    self.store.remove_item(&self.storage_key(&victim));
                    self.stats_mut().record_eviction();
                    debug!("Evicted least recently used key '{}'", victim);
                }
            }
        }

        if let Err(first) = self.store.set_item(&storage_key, &raw) {
            warn!("Write for '{}' refused ({}); repairing namespace", key, first);
            order = self.repair(now_ms)?.order;
            if policy::needs_eviction(order.len(), order.contains(key), self.config.max_entries) {
                if let Some(victim) = order.evict_oldest() {
                    self.store.remove_item(&self.storage_key(&victim));
                    self.stats_mut().record_eviction();
                }
            }
            self.store.set_item(&storage_key, &raw).map_err(|second| {
                CacheError::StorageFull(format!("write for '{key}' failed after repair: {second}"))
            })?;
        }

        order.touch(key);
        if let Err(e) = self.save_order(&order) {
            // The entry itself is stored. Repair rebuilds and re-persists the
            // order; only a store with no room left turns this into an error.
            warn!("Order document write refused ({}); repairing namespace", e);
            self.repair(now_ms)?;
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.store.remove_item(&self.storage_key(key));
        self.forget_in_order(key);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        // Only this namespace; foreign keys in a shared store are untouched.
        for storage_key in self.store.keys() {
            if storage_key.starts_with(&self.prefix) {
                self.store.remove_item(&storage_key);
            }
        }
        Ok(())
    }

    async fn cleanup_expired(&self) -> Result<usize> {
        Ok(self.repair(current_timestamp_ms())?.dropped)
    }

    async fn len(&self) -> Result<usize> {
        Ok(self
            .store
            .keys()
            .iter()
            .filter(|storage_key| self.cache_key(storage_key).is_some())
            .count())
    }

    fn stats(&self) -> CacheStats {
        self.stats_mut().clone()
    }
}

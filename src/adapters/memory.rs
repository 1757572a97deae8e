//! In-Memory Adapter Module
//!
//! Volatile backend and the policy reference: a `HashMap` of entries plus an
//! [`AccessOrder`], both behind a single `RwLock` so a lookup and the recency
//! touch (or expiry purge) it triggers are one atomic step.
//!
//! Everything lives in process memory; dropping the adapter drops the cache.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

use crate::adapters::{Lookup, StorageAdapter};
use crate::cache::{current_timestamp_ms, policy, AccessOrder, CacheEntry, CacheStats};
use crate::config::CacheConfig;
use crate::error::Result;

// == State ==

/// Entry map and recency order; every mutation updates both together.
struct MemoryState {
    entries: HashMap<String, CacheEntry>,
    order: AccessOrder,
}

impl MemoryState {
    /// Drops every entry whose TTL has elapsed at `now_ms`.
    ///
    /// Returns how many entries were removed.
    fn sweep_expired(&mut self, now_ms: u64) -> usize {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired_at(now_ms))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            self.entries.remove(key);
            self.order.remove(key);
        }

        expired.len()
    }
}

// == Memory Adapter ==

/// In-process storage backend with TTL expiry and LRU eviction.
///
/// # Example
///
/// ```
/// use keystash::{CacheConfig, MemoryAdapter, StorageAdapter};
/// use serde_json::json;
///
/// # tokio_test::block_on(async {
/// let adapter = MemoryAdapter::new(CacheConfig::new().with_max_entries(100));
/// adapter.set("user:1", json!({"name": "Ada"}), None).await.unwrap();
/// assert!(adapter.has("user:1").await.unwrap());
/// # });
/// ```
pub struct MemoryAdapter {
    state: RwLock<MemoryState>,
    stats: Mutex<CacheStats>,
    config: CacheConfig,
}

impl MemoryAdapter {
    /// Creates an empty adapter governed by `config`.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            state: RwLock::new(MemoryState {
                entries: HashMap::new(),
                order: AccessOrder::new(),
            }),
            stats: Mutex::new(CacheStats::new()),
            config,
        }
    }

    fn stats_mut(&self) -> std::sync::MutexGuard<'_, CacheStats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl StorageAdapter for MemoryAdapter {
    async fn get(&self, key: &str) -> Result<Lookup> {
        // Write lock: a hit re-orders recency, an expired entry gets purged.
        let mut state = self.state.write().await;
        let now_ms = current_timestamp_ms();

        let Some(entry) = state.entries.get(key) else {
            self.stats_mut().record_miss();
            return Ok(Lookup::Miss);
        };

        if entry.is_expired_at(now_ms) {
            state.entries.remove(key);
            state.order.remove(key);
            let mut stats = self.stats_mut();
            stats.record_miss();
            stats.record_expirations(1);
            return Ok(Lookup::Expired);
        }

        let value = entry.value.clone();
        state.order.touch(key);
        self.stats_mut().record_hit();
        Ok(Lookup::Hit(value))
    }

    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<()> {
        let mut state = self.state.write().await;
        let now_ms = current_timestamp_ms();

        let tracked = state.order.contains(key);
        if policy::needs_eviction(state.entries.len(), tracked, self.config.max_entries) {
            // Only live entries count against capacity, so purge before evicting.
            let swept = state.sweep_expired(now_ms);
            if swept > 0 {
                self.stats_mut().record_expirations(swept as u64);
            }

            if policy::needs_eviction(state.entries.len(), tracked, self.config.max_entries) {
                if let Some(victim) = state.order.evict_oldest() {
                    state.entries.remove(&victim);
                    self.stats_mut().record_eviction();
                    debug!("Evicted least recently used key '{}'", victim);
                }
            }
        }

        let entry = CacheEntry::new(value, policy::effective_ttl(ttl, &self.config));
        state.entries.insert(key.to_string(), entry);
        state.order.touch(key);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut state = self.state.write().await;
        state.entries.remove(key);
        state.order.remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let mut state = self.state.write().await;
        state.entries.clear();
        state.order.clear();
        Ok(())
    }

    async fn cleanup_expired(&self) -> Result<usize> {
        let mut state = self.state.write().await;
        let removed = state.sweep_expired(current_timestamp_ms());
        if removed > 0 {
            self.stats_mut().record_expirations(removed as u64);
            debug!("Swept {} expired entries", removed);
        }
        Ok(removed)
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.state.read().await.entries.len())
    }

    fn stats(&self) -> CacheStats {
        self.stats_mut().clone()
    }
}

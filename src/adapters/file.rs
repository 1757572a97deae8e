//! File Adapter Module
//!
//! Persistent backend storing one JSON file per entry inside a directory.
//! File names are the SHA-256 of the cache key (plus `.json`), so any key is
//! a valid file name; the original key travels inside the entry itself.
//! Recency lives beside the entries in `__access_order.json`.
//!
//! The directory is shared, slow, and editable by anyone, so every `set`
//! starts with a repair pass that drops unreadable and expired files and
//! reconciles the index with what is actually on disk.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::adapters::{Lookup, RepairOutcome, StorageAdapter};
use crate::cache::{
    current_timestamp_ms, policy, AccessOrder, CacheEntry, CacheStats, EntryCodec, JsonCodec,
    StoredEntry, ACCESS_ORDER_KEY,
};
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};

// == File Adapter ==

/// Storage backend writing each entry to its own file.
///
/// The directory is created lazily on the first write; reads against a
/// directory that does not exist yet are plain misses.
pub struct FileAdapter {
    directory: PathBuf,
    config: CacheConfig,
    codec: Arc<dyn EntryCodec>,
    stats: Mutex<CacheStats>,
}

impl FileAdapter {
    /// Creates an adapter rooted at `directory` with the default JSON codec.
    pub fn new(directory: impl Into<PathBuf>, config: CacheConfig) -> Self {
        Self {
            directory: directory.into(),
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

    /// Directory the adapter reads and writes.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn stats_mut(&self) -> std::sync::MutexGuard<'_, CacheStats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hashed file name for a cache key. Irreversible, which is why each
    /// entry carries its own key for the repair scan.
    fn entry_file_name(key: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        format!("{:x}.json", hasher.finalize())
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.directory.join(Self::entry_file_name(key))
    }

    fn index_file_name() -> String {
        format!("{}.json", ACCESS_ORDER_KEY)
    }

    fn index_path(&self) -> PathBuf {
        self.directory.join(Self::index_file_name())
    }

    /// Removes a file, swallowing the not-found case. Used for evictions and
    /// purges, where a vanished file means the work is already done.
    async fn remove_file_quiet(&self, path: &Path) {
        if let Err(e) = fs::remove_file(path).await {
            if e.kind() != ErrorKind::NotFound {
                warn!("Could not remove cache file {}: {}", path.display(), e);
            }
        }
    }

    // == Index ==

    /// Loads the persisted access order. A missing or unreadable index comes
    /// back as `None` and is rebuilt by the next repair.
    async fn load_index(&self) -> Option<AccessOrder> {
        let raw = match fs::read_to_string(self.index_path()).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("Could not read access-order index: {}", e);
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(order) => Some(order),
            Err(e) => {
                warn!("Unreadable access-order index ({}); will rebuild", e);
                None
            }
        }
    }

    async fn save_index(&self, order: &AccessOrder) -> Result<()> {
        let raw = serde_json::to_string(order)
            .map_err(|e| CacheError::codec("access-order index", e))?;
        fs::create_dir_all(&self.directory).await?;
        fs::write(self.index_path(), raw).await?;
        Ok(())
    }

    /// Best-effort recency promotion; reads never fail on an index write.
    async fn touch_in_index(&self, key: &str) {
        let mut order = self.load_index().await.unwrap_or_else(AccessOrder::new);
        order.touch(key);
        if let Err(e) = self.save_index(&order).await {
            warn!("Recency update for '{}' not persisted: {}", key, e);
        }
    }

    /// Best-effort removal from the index after a purge or delete.
    async fn forget_in_index(&self, key: &str) {
        let Some(mut order) = self.load_index().await else {
            return;
        };
        if order.remove(key) {
            if let Err(e) = self.save_index(&order).await {
                warn!("Index update after removing '{}' not persisted: {}", key, e);
            }
        }
    }

    // == Repair ==

    /// Walks the directory, deleting unreadable and expired entry files.
    /// Returns the surviving cache keys (read out of the entries themselves)
    /// and how many files were purged.
    async fn scan_and_purge(&self, now_ms: u64) -> std::io::Result<(Vec<String>, usize)> {
        let mut survivors = Vec::new();
        let mut dropped = 0usize;

        let mut dir = match fs::read_dir(&self.directory).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok((survivors, dropped)),
            Err(e) => return Err(e),
        };

        let index_name = Self::index_file_name();
        while let Some(dir_entry) = dir.next_entry().await? {
            let file_name = dir_entry.file_name().to_string_lossy().into_owned();
            if !file_name.ends_with(".json") || file_name == index_name {
                continue;
            }
            let path = dir_entry.path();

            let raw = match fs::read_to_string(&path).await {
                Ok(raw) => raw,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => {
                    // Cannot prove corruption without reading it; leave the
                    // file alone and let the index forget it for now.
                    warn!("Could not read cache file {}: {}", path.display(), e);
                    continue;
                }
            };

            match self.codec.decode(&raw) {
                Ok(stored) if Self::entry_file_name(&stored.key) != file_name => {
                    warn!(
                        "File {} claims key '{}' stored elsewhere; dropping",
                        path.display(),
                        stored.key
                    );
                    self.remove_file_quiet(&path).await;
                    dropped += 1;
                }
                Ok(stored) if stored.is_expired_at(now_ms) => {
                    self.remove_file_quiet(&path).await;
                    dropped += 1;
                }
                Ok(stored) => survivors.push(stored.key),
                Err(e) => {
                    warn!("Dropping unreadable cache file {}: {}", path.display(), e);
                    self.remove_file_quiet(&path).await;
                    dropped += 1;
                }
            }
        }

        Ok((survivors, dropped))
    }

    /// Full directory repair: purge dead files, reconcile the index against
    /// the survivors, evict down to capacity, persist the rebuilt index.
    async fn repair(&self, now_ms: u64) -> Result<RepairOutcome> {
        let prior = self.load_index().await.unwrap_or_else(AccessOrder::new);
        let (survivors, dropped) = self.scan_and_purge(now_ms).await?;

        let mut order = policy::reconcile_order(&prior, survivors.iter().map(String::as_str));
        let evicted_keys = policy::evict_overflow(&mut order, self.config.max_entries);
        for key in &evicted_keys {
            self.remove_file_quiet(&self.entry_path(key)).await;
        }

        self.save_index(&order).await?;

        let evicted = evicted_keys.len();
        if dropped > 0 || evicted > 0 {
            let mut stats = self.stats_mut();
            stats.record_expirations(dropped as u64);
            for _ in 0..evicted {
                stats.record_eviction();
            }
            info!(
                "Repaired {}: dropped {}, evicted {}, tracking {}",
                self.directory.display(),
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
impl StorageAdapter for FileAdapter {
    async fn get(&self, key: &str) -> Result<Lookup> {
        let path = self.entry_path(key);
        let raw = match fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                self.stats_mut().record_miss();
                return Ok(Lookup::Miss);
            }
            Err(e) => {
                warn!("Could not read cache file {}: {}", path.display(), e);
                self.stats_mut().record_miss();
                return Ok(Lookup::Miss);
            }
        };

        let stored = match self.codec.decode(&raw) {
            Ok(stored) if stored.key == key => stored,
            Ok(stored) => {
                warn!("File for '{}' claims key '{}'; dropping", key, stored.key);
                self.remove_file_quiet(&path).await;
                self.forget_in_index(key).await;
                let mut stats = self.stats_mut();
                stats.record_miss();
                stats.record_expirations(1);
                return Ok(Lookup::Miss);
            }
            Err(e) => {
                warn!("Dropping unreadable entry for '{}': {}", key, e);
                self.remove_file_quiet(&path).await;
                self.forget_in_index(key).await;
                let mut stats = self.stats_mut();
                stats.record_miss();
                stats.record_expirations(1);
                return Ok(Lookup::Miss);
            }
        };

        if stored.is_expired_at(current_timestamp_ms()) {
            self.remove_file_quiet(&path).await;
            self.forget_in_index(key).await;
            let mut stats = self.stats_mut();
            stats.record_miss();
            stats.record_expirations(1);
            return Ok(Lookup::Expired);
        }

        self.touch_in_index(key).await;
        self.stats_mut().record_hit();
        Ok(Lookup::Hit(stored.entry.value))
    }

    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<()> {
        let now_ms = current_timestamp_ms();
        let entry = CacheEntry::new(value, policy::effective_ttl(ttl, &self.config));
        let raw = self.codec.encode(&StoredEntry::new(key, entry))?;
        let path = self.entry_path(key);

        // The directory is open to outside edits, so reconcile before writing.
        let mut order = self.repair(now_ms).await?.order;
        if policy::needs_eviction(order.len(), order.contains(key), self.config.max_entries) {
            if let Some(victim) = order.evict_oldest() {
                self.remove_file_quiet(&self.entry_path(&victim)).await;
                self.stats_mut().record_eviction();
                debug!("Evicted least recently used key '{}'", victim);
            }
        }

        fs::create_dir_all(&self.directory).await?;
        if let Err(first) = fs::write(&path, &raw).await {
            warn!("Write for '{}' failed ({}); repairing directory", key, first);
            order = self.repair(now_ms).await?.order;
            if policy::needs_eviction(order.len(), order.contains(key), self.config.max_entries) {
                if let Some(victim) = order.evict_oldest() {
                    self.remove_file_quiet(&self.entry_path(&victim)).await;
                    self.stats_mut().record_eviction();
                }
            }
            fs::write(&path, &raw).await.map_err(|second| {
                CacheError::StorageFull(format!("write for '{key}' failed after repair: {second}"))
            })?;
        }

        order.touch(key);
        self.save_index(&order).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.entry_path(key)).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        self.forget_in_index(key).await;
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let mut dir = match fs::read_dir(&self.directory).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        // Entry files and the index only; anything else in the directory is
        // not ours to delete.
        while let Some(dir_entry) = dir.next_entry().await? {
            let file_name = dir_entry.file_name().to_string_lossy().into_owned();
            if file_name.ends_with(".json") {
                self.remove_file_quiet(&dir_entry.path()).await;
            }
        }
        Ok(())
    }

    async fn cleanup_expired(&self) -> Result<usize> {
        Ok(self.repair(current_timestamp_ms()).await?.dropped)
    }

    async fn len(&self) -> Result<usize> {
        let mut dir = match fs::read_dir(&self.directory).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let index_name = Self::index_file_name();
        let mut count = 0usize;
        while let Some(dir_entry) = dir.next_entry().await? {
            let file_name = dir_entry.file_name().to_string_lossy().into_owned();
            if file_name.ends_with(".json") && file_name != index_name {
                count += 1;
            }
        }
        Ok(count)
    }

    fn stats(&self) -> CacheStats {
        self.stats_mut().clone()
    }
}

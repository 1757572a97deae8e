//! Storage Adapters Module
//!
//! One trait, three backends:
//! - [`MemoryAdapter`] - volatile in-process map, the reference implementation
//! - [`KeyValueAdapter`] - synchronous string-keyed store behind a [`KeyValueStore`]
//! - [`FileAdapter`] - one file per entry in a directory, plus an index file
//!
//! The backends differ in persistence and failure surface, never in policy:
//! under single-writer access all three are behaviorally indistinguishable.

mod file;
mod kv;
mod memory;

pub use file::FileAdapter;
pub use kv::{KeyValueAdapter, KeyValueStore, KvWriteError, MemoryKvStore};
pub use memory::MemoryAdapter;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::cache::{AccessOrder, CacheStats};
use crate::error::Result;

// == Lookup ==
/// Outcome of an adapter-level lookup.
///
/// Callers only distinguish "value" from "no value"; the third variant lets
/// the event layer report that a lookup discovered and purged an expired
/// entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    /// Live entry found; key promoted to most recently used
    Hit(Value),
    /// No entry stored under the key
    Miss,
    /// Entry existed but its TTL had elapsed; it has been purged
    Expired,
}

impl Lookup {
    /// True only for a live entry.
    pub fn is_hit(&self) -> bool {
        matches!(self, Lookup::Hit(_))
    }

    /// Collapses the lookup into the caller-facing value-or-nothing view.
    pub fn into_value(self) -> Option<Value> {
        match self {
            Lookup::Hit(value) => Some(value),
            Lookup::Miss | Lookup::Expired => None,
        }
    }
}

// == Storage Adapter ==
/// The capability set every storage backend implements.
///
/// Lookups never fail because of what is stored: missing, expired, and
/// unreadable entries all degrade to [`Lookup::Miss`]-like outcomes with
/// silent cleanup. `set` is the only operation that surfaces storage
/// failures, and only after one repair-and-retry cycle.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Looks up a key, applying lazy expiry and promoting recency on a hit.
    async fn get(&self, key: &str) -> Result<Lookup>;

    /// Stores a value under a key, evicting the least recently used entry
    /// first if the namespace is at capacity and the key is new.
    ///
    /// `ttl` overrides the adapter's configured default lifetime for this
    /// entry only; `None` falls back to that default.
    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<()>;

    /// Removes a key. Deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Removes every entry in this adapter's namespace.
    async fn clear(&self) -> Result<()>;

    /// Checks for a live entry under the key.
    ///
    /// Defined as `get` producing a hit, so it applies the same expiry check
    /// and renews recency exactly like a read.
    async fn has(&self, key: &str) -> Result<bool> {
        Ok(self.get(key).await?.is_hit())
    }

    /// Sweeps the namespace, dropping every expired (or unreadable) entry.
    ///
    /// Returns the number of entries removed. Expiry is otherwise lazy, so
    /// storage can transiently hold expired entries until a lookup, a write
    /// at capacity, or this sweep touches them.
    async fn cleanup_expired(&self) -> Result<usize>;

    /// Number of entries physically stored (expired-but-unswept included).
    async fn len(&self) -> Result<usize>;

    /// Snapshot of this adapter's performance counters.
    fn stats(&self) -> CacheStats;
}

// == Repair Outcome ==
/// What a persistent backend's repair pass did: the reconciled access order
/// plus how many entries were dropped (expired/unreadable) and evicted
/// (capacity).
pub(crate) struct RepairOutcome {
    pub order: AccessOrder,
    pub dropped: usize,
    pub evicted: usize,
}

//! # keystash
//!
//! Key/value caching with TTL expiry and LRU eviction over pluggable
//! storage backends.
//!
//! ## Features
//!
//! - **Three backends** - volatile in-memory, any string-keyed store
//!   (via the [`KeyValueStore`] trait), and one-file-per-entry on disk
//! - **Lazy TTL expiry** - entries expire when a lookup, a write at
//!   capacity, or an explicit sweep finds them stale
//! - **LRU eviction** - bounded caches drop the least recently used key;
//!   recency survives restarts on the persistent backends
//! - **Self-healing storage** - unreadable entries degrade to misses and a
//!   failed write triggers one repair-and-retry pass over the namespace
//! - **Typed facade** - serde values in and out, with cache events
//!   ([`CacheEventKind`]) and hit/miss counters ([`CacheStats`])
//! - **Memoization** - [`Memoizer`] caches the results of async
//!   computations
//!
//! ## Quick Start
//!
//! ```
//! use keystash::{Cache, CacheConfig};
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let cache = Cache::in_memory(
//!     CacheConfig::new()
//!         .with_ttl(Duration::from_secs(300))
//!         .with_max_entries(1000),
//! );
//!
//! cache.set("user:42", &serde_json::json!({"name": "Ada"})).await.unwrap();
//! assert!(cache.has("user:42").await.unwrap());
//! # });
//! ```

pub mod adapters;
pub mod cache;
pub mod config;
pub mod error;
pub mod events;
pub mod facade;
pub mod memo;

pub use adapters::{
    FileAdapter, KeyValueAdapter, KeyValueStore, KvWriteError, Lookup, MemoryAdapter,
    MemoryKvStore, StorageAdapter,
};
pub use cache::{CacheEntry, CacheStats, EntryCodec, JsonCodec, StoredEntry};
pub use config::CacheConfig;
pub use error::{CacheError, Result};
pub use events::{CacheEvent, CacheEventKind, ListenerId};
pub use facade::Cache;
pub use memo::Memoizer;

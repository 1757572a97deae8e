//! Configuration Module
//!
//! Cache policy options shared by every storage backend.

use std::env;
use std::time::Duration;

/// Policy options for one cache namespace.
///
/// Both knobs are optional: without `max_entries` the cache is unbounded and
/// never evicts by size, and without `ttl` entries only expire when a
/// per-call TTL is supplied on `set`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheConfig {
    /// Default entry lifetime; a per-call TTL on `set` takes precedence
    pub ttl: Option<Duration>,
    /// Maximum number of entries before LRU eviction kicks in
    pub max_entries: Option<usize>,
}

impl CacheConfig {
    /// Creates a config with no TTL and no size bound.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the default entry lifetime.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Sets the capacity bound that triggers LRU eviction.
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = Some(max_entries);
        self
    }

    /// Creates a config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_TTL_MS` - Default TTL in milliseconds (absent: entries never expire)
    /// - `CACHE_MAX_ENTRIES` - Capacity bound (absent: unbounded)
    pub fn from_env() -> Self {
        Self {
            ttl: env::var("CACHE_TTL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis),
            max_entries: env::var("CACHE_MAX_ENTRIES")
                .ok()
                .and_then(|v| v.parse().ok()),
        }
    }
}

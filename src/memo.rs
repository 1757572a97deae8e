//! Memoization Module
//!
//! Caches the results of expensive async computations behind a [`Cache`].
//! No single-flight coordination: concurrent callers missing the same key
//! each run the computation, and the last finisher's value wins. Callers
//! needing dedup should serialize at the call site.

use std::future::Future;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{CacheError, Result};
use crate::facade::Cache;

// == Memoizer ==

/// Compute-through cache for async functions.
///
/// # Example
///
/// ```
/// use keystash::{Cache, CacheConfig, Memoizer};
///
/// # tokio_test::block_on(async {
/// let memo = Memoizer::new(Cache::in_memory(CacheConfig::new()));
///
/// let doubled = memo
///     .get_or_compute("double:21", || async { 21 * 2 })
///     .await
///     .unwrap();
/// assert_eq!(doubled, 42);
/// # });
/// ```
pub struct Memoizer {
    cache: Cache,
}

impl Memoizer {
    pub fn new(cache: Cache) -> Self {
        Self { cache }
    }

    /// The cache backing this memoizer, for direct reads or listeners.
    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    /// Returns the cached value for `key`, computing and storing it first
    /// on a miss. The stored value inherits the backend's default TTL.
    pub async fn get_or_compute<T, F, Fut>(&self, key: &str, compute: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        if let Some(cached) = self.cache.get(key).await? {
            return Ok(cached);
        }
        let value = compute().await;
        self.cache.set(key, &value).await?;
        Ok(value)
    }

    /// [`get_or_compute`](Self::get_or_compute) with an explicit lifetime
    /// for the computed value.
    pub async fn get_or_compute_with_ttl<T, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        compute: F,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        if let Some(cached) = self.cache.get(key).await? {
            return Ok(cached);
        }
        let value = compute().await;
        self.cache.set_with_ttl(key, &value, ttl).await?;
        Ok(value)
    }

    /// Like [`get_or_compute`](Self::get_or_compute) for computations that
    /// can fail. A computation error is handed back untouched and nothing is
    /// stored, so the next caller retries.
    ///
    /// The outer [`Result`] carries cache failures, the inner one the
    /// computation's own outcome.
    pub async fn try_get_or_compute<T, E, F, Fut>(
        &self,
        key: &str,
        compute: F,
    ) -> Result<std::result::Result<T, E>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        if let Some(cached) = self.cache.get(key).await? {
            return Ok(Ok(cached));
        }
        match compute().await {
            Ok(value) => {
                self.cache.set(key, &value).await?;
                Ok(Ok(value))
            }
            Err(e) => Ok(Err(e)),
        }
    }

    /// Drops a memoized result so the next lookup recomputes.
    pub async fn invalidate(&self, key: &str) -> Result<()> {
        self.cache.delete(key).await
    }

    /// Builds a stable cache key from a prefix and the computation's
    /// arguments. Arguments serialize to JSON, so two calls with equal
    /// arguments map to the same key.
    pub fn key_for<A: Serialize + ?Sized>(prefix: &str, args: &A) -> Result<String> {
        let raw = serde_json::to_string(args)
            .map_err(|e| CacheError::codec(format!("memo key for '{prefix}'"), e))?;
        Ok(format!("{prefix}:{raw}"))
    }
}

//! End-to-end tests at the facade level: typed values, events, memoization,
//! and persistence through `Cache::on_disk`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

use keystash::{
    Cache, CacheConfig, CacheError, CacheEventKind, KeyValueAdapter, Memoizer, MemoryKvStore,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Profile {
    name: String,
    karma: i64,
}

#[tokio::test]
async fn typed_values_survive_a_disk_cache_restart() -> Result<()> {
    init_tracing();
    let dir = TempDir::new()?;
    let profile = Profile {
        name: "ada".to_string(),
        karma: 1024,
    };

    {
        let cache = Cache::on_disk(dir.path(), CacheConfig::new());
        cache.set("profile:ada", &profile).await?;
    }

    let reopened = Cache::on_disk(dir.path(), CacheConfig::new());
    let loaded: Option<Profile> = reopened.get("profile:ada").await?;
    assert_eq!(loaded, Some(profile));
    Ok(())
}

#[tokio::test]
async fn events_trace_the_full_entry_lifecycle() -> Result<()> {
    init_tracing();
    let cache = Cache::in_memory(CacheConfig::new());
    let log = Arc::new(Mutex::new(Vec::new()));

    for kind in [
        CacheEventKind::Set,
        CacheEventKind::Get,
        CacheEventKind::Delete,
        CacheEventKind::Clear,
        CacheEventKind::Expired,
    ] {
        let log_clone = Arc::clone(&log);
        cache.on(kind, move |event| {
            log_clone.lock().unwrap().push(event.kind);
        });
    }

    cache.set("k", "v").await?;
    let _: Option<String> = cache.get("k").await?; // hit
    let _: Option<String> = cache.get("absent").await?; // silent miss

    cache
        .set_with_ttl("fleeting", "v", Duration::from_millis(20))
        .await?;
    tokio::time::sleep(Duration::from_millis(50)).await;
    let _: Option<String> = cache.get("fleeting").await?; // expired

    cache.delete("k").await?;
    cache.clear().await?;

    assert_eq!(
        log.lock().unwrap().as_slice(),
        &[
            CacheEventKind::Set,
            CacheEventKind::Get,
            CacheEventKind::Set,
            CacheEventKind::Expired,
            CacheEventKind::Delete,
            CacheEventKind::Clear,
        ]
    );
    Ok(())
}

#[tokio::test]
async fn events_fire_for_disk_backed_caches_too() -> Result<()> {
    init_tracing();
    let dir = TempDir::new()?;
    let cache = Cache::on_disk(dir.path(), CacheConfig::new());
    let sets = Arc::new(AtomicUsize::new(0));

    let sets_clone = Arc::clone(&sets);
    cache.on(CacheEventKind::Set, move |_| {
        sets_clone.fetch_add(1, Ordering::SeqCst);
    });

    cache.set("a", &1).await?;
    cache.set("b", &2).await?;

    assert_eq!(sets.load(Ordering::SeqCst), 2);
    Ok(())
}

#[tokio::test]
async fn memoized_results_survive_a_disk_cache_restart() -> Result<()> {
    init_tracing();
    let dir = TempDir::new()?;
    let calls = Arc::new(AtomicUsize::new(0));

    {
        let memo = Memoizer::new(Cache::on_disk(dir.path(), CacheConfig::new()));
        let calls_clone = Arc::clone(&calls);
        let value: u64 = memo
            .get_or_compute("expensive", move || async move {
                calls_clone.fetch_add(1, Ordering::SeqCst);
                99
            })
            .await?;
        assert_eq!(value, 99);
    }

    // A new process over the same directory reuses the stored result.
    let memo = Memoizer::new(Cache::on_disk(dir.path(), CacheConfig::new()));
    let calls_clone = Arc::clone(&calls);
    let value: u64 = memo
        .get_or_compute("expensive", move || async move {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            0
        })
        .await?;

    assert_eq!(value, 99);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn memo_keys_built_from_arguments_partition_the_cache() -> Result<()> {
    init_tracing();
    let memo = Memoizer::new(Cache::in_memory(CacheConfig::new()));

    let for_ada = Memoizer::key_for("profile", &Profile {
        name: "ada".to_string(),
        karma: 1,
    })?;
    let for_grace = Memoizer::key_for("profile", &Profile {
        name: "grace".to_string(),
        karma: 1,
    })?;
    assert_ne!(for_ada, for_grace);

    let a: String = memo
        .get_or_compute(&for_ada, || async { "ada's result".to_string() })
        .await?;
    let g: String = memo
        .get_or_compute(&for_grace, || async { "grace's result".to_string() })
        .await?;

    assert_eq!(a, "ada's result");
    assert_eq!(g, "grace's result");
    Ok(())
}

#[tokio::test]
async fn quota_exhaustion_surfaces_through_the_facade() -> Result<()> {
    init_tracing();
    let store = Arc::new(MemoryKvStore::with_capacity_bytes(64));
    let cache = Cache::new(Arc::new(KeyValueAdapter::new(
        store,
        "app:",
        CacheConfig::new(),
    )));

    let oversized = "x".repeat(500);
    let err = cache.set("big", &oversized).await.unwrap_err();
    assert!(matches!(err, CacheError::StorageFull(_)));

    // The failed write leaves the cache readable and consistent.
    assert_eq!(cache.len().await?, 0);
    assert!(!cache.has("big").await?);
    Ok(())
}

#[tokio::test]
async fn expired_entries_repair_away_under_quota_pressure() -> Result<()> {
    init_tracing();
    let store = Arc::new(MemoryKvStore::with_capacity_bytes(512));
    let cache = Cache::new(Arc::new(KeyValueAdapter::new(
        store,
        "app:",
        CacheConfig::new().with_ttl(Duration::from_millis(20)),
    )));

    let filler = "x".repeat(120);
    cache.set("old1", &filler).await?;
    cache.set("old2", &filler).await?;
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Quota is exhausted but everything in it is expired; one repair pass
    // makes the write fit.
    cache
        .set_with_ttl("new", &filler, Duration::from_secs(60))
        .await?;

    assert!(cache.has("new").await?);
    assert_eq!(cache.len().await?, 1);
    Ok(())
}

#[tokio::test]
async fn facade_len_and_cleanup_pass_through() -> Result<()> {
    init_tracing();
    let cache = Cache::in_memory(CacheConfig::new());

    cache.set("keep", &1).await?;
    cache
        .set_with_ttl("drop", &2, Duration::from_millis(20))
        .await?;
    assert_eq!(cache.len().await?, 2);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(cache.cleanup_expired().await?, 1);
    assert_eq!(cache.len().await?, 1);
    Ok(())
}

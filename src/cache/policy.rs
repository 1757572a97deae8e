//! Eviction Policy Module
//!
//! The LRU/TTL rules every storage backend must honor, expressed as pure
//! helpers over [`AccessOrder`] so the three adapters cannot drift apart.
//!
//! The rules, in order, for a write:
//! 1. If the namespace is at capacity and the key is new, evict exactly one
//!    entry: the head of the access order. Capacity is judged against live
//!    entries, so expired ones are purged first when the count matters.
//! 2. Insert the new entry with its expiry computed from the effective TTL.
//! 3. Move the key to the tail of the access order.
//!
//! Reads promote the key to the tail on a hit and purge on an expired hit.
//! Repair passes reconcile the access order against whatever actually
//! survived in the backing medium, then bulk-evict down to capacity.

use std::collections::HashSet;
use std::time::Duration;

use crate::cache::AccessOrder;
use crate::config::CacheConfig;

// == Effective TTL ==
/// Resolves the TTL for one write: an explicit per-call TTL wins, otherwise
/// the namespace default applies, otherwise the entry never expires.
pub fn effective_ttl(per_call: Option<Duration>, config: &CacheConfig) -> Option<Duration> {
    per_call.or(config.ttl)
}

// == Capacity Check ==
/// Decides whether a write must evict one entry first.
///
/// Eviction happens only when a capacity bound is configured, the namespace
/// holds at least that many live entries, and the key being written is not
/// already one of them (overwrites never grow the namespace).
pub fn needs_eviction(live_len: usize, key_tracked: bool, max_entries: Option<usize>) -> bool {
    match max_entries {
        Some(max) => !key_tracked && live_len >= max,
        None => false,
    }
}

// == Order Reconciliation ==
/// Rebuilds an access order to match exactly the keys that survived a
/// namespace scan.
///
/// Tracked survivors keep their relative recency; surviving keys the order
/// had lost are appended at the tail (they were written recently enough to
/// exist); tracked keys whose storage vanished are dropped.
pub fn reconcile_order<'a, I>(prior: &AccessOrder, survivors: I) -> AccessOrder
where
    I: IntoIterator<Item = &'a str>,
{
    let mut survivor_set = HashSet::new();
    let mut untracked = Vec::new();
    for key in survivors {
        if survivor_set.insert(key) && !prior.contains(key) {
            untracked.push(key);
        }
    }

    let mut rebuilt = AccessOrder::new();
    for key in prior.keys() {
        if survivor_set.contains(key) {
            rebuilt.touch(key);
        }
    }
    for key in untracked {
        rebuilt.touch(key);
    }
    rebuilt
}

// == Overflow Eviction ==
/// Pops keys from the head until the order is within the capacity bound.
///
/// Returns the evicted keys, oldest first, so the caller can delete their
/// backing storage. Used by repair, which unlike a single write may shed
/// several entries at once.
pub fn evict_overflow(order: &mut AccessOrder, max_entries: Option<usize>) -> Vec<String> {
    let Some(max) = max_entries else {
        return Vec::new();
    };

    let mut evicted = Vec::new();
    while order.len() > max {
        match order.evict_oldest() {
            Some(key) => evicted.push(key),
            None => break,
        }
    }
    evicted
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    fn keys_of(order: &AccessOrder) -> Vec<&str> {
        order.keys().collect()
    }

    #[test]
    fn test_effective_ttl_per_call_wins() {
        let config = CacheConfig::new().with_ttl(Duration::from_secs(60));
        let ttl = effective_ttl(Some(Duration::from_secs(5)), &config);
        assert_eq!(ttl, Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_effective_ttl_falls_back_to_config() {
        let config = CacheConfig::new().with_ttl(Duration::from_secs(60));
        assert_eq!(effective_ttl(None, &config), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_effective_ttl_absent_everywhere() {
        assert_eq!(effective_ttl(None, &CacheConfig::new()), None);
    }

    #[test]
    fn test_needs_eviction_unbounded_never_evicts() {
        assert!(!needs_eviction(10_000, false, None));
    }

    #[test]
    fn test_needs_eviction_at_capacity_new_key() {
        assert!(needs_eviction(2, false, Some(2)));
        assert!(needs_eviction(3, false, Some(2)));
    }

    #[test]
    fn test_needs_eviction_under_capacity() {
        assert!(!needs_eviction(1, false, Some(2)));
    }

    #[test]
    fn test_needs_eviction_overwrite_never_evicts() {
        // Overwriting a tracked key does not grow the namespace
        assert!(!needs_eviction(2, true, Some(2)));
    }

    #[test]
    fn test_reconcile_keeps_tracked_survivor_order() {
        let prior = AccessOrder::from_keys(["a", "b", "c"]);
        let rebuilt = reconcile_order(&prior, ["c", "a", "b"]);
        assert_eq!(keys_of(&rebuilt), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_reconcile_drops_vanished_keys() {
        let prior = AccessOrder::from_keys(["a", "b", "c"]);
        let rebuilt = reconcile_order(&prior, ["a", "c"]);
        assert_eq!(keys_of(&rebuilt), vec!["a", "c"]);
    }

    #[test]
    fn test_reconcile_appends_untracked_survivors() {
        let prior = AccessOrder::from_keys(["a", "b"]);
        let rebuilt = reconcile_order(&prior, ["orphan", "a", "b"]);
        assert_eq!(keys_of(&rebuilt), vec!["a", "b", "orphan"]);
    }

    #[test]
    fn test_reconcile_empty_scan_empties_order() {
        let prior = AccessOrder::from_keys(["a", "b"]);
        let rebuilt = reconcile_order(&prior, []);
        assert!(rebuilt.is_empty());
    }

    #[test]
    fn test_evict_overflow_unbounded() {
        let mut order = AccessOrder::from_keys(["a", "b", "c"]);
        assert!(evict_overflow(&mut order, None).is_empty());
        assert_eq!(order.len(), 3);
    }

    #[test]
    fn test_evict_overflow_sheds_oldest_first() {
        let mut order = AccessOrder::from_keys(["a", "b", "c", "d"]);
        let evicted = evict_overflow(&mut order, Some(2));

        assert_eq!(evicted, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(keys_of(&order), vec!["c", "d"]);
    }

    #[test]
    fn test_evict_overflow_within_bound_is_noop() {
        let mut order = AccessOrder::from_keys(["a", "b"]);
        assert!(evict_overflow(&mut order, Some(2)).is_empty());
        assert_eq!(order.len(), 2);
    }
}

//! Event Layer Module
//!
//! Synchronous notifications for cache activity. Listeners register per
//! event kind and run inline, in registration order, on the task that
//! performed the operation. Misses emit nothing; discovering an expired
//! entry emits [`CacheEventKind::Expired`] instead of a read event.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;

// == Events ==

/// What happened in the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheEventKind {
    /// A value was stored
    Set,
    /// A lookup found a live value
    Get,
    /// A key was deleted
    Delete,
    /// The whole namespace was emptied
    Clear,
    /// A lookup found an entry whose TTL had elapsed
    Expired,
}

/// A single cache notification.
#[derive(Debug, Clone, Serialize)]
pub struct CacheEvent {
    pub kind: CacheEventKind,
    /// The key involved; `None` for namespace-wide events like `Clear`.
    pub key: Option<String>,
    /// When the event was emitted.
    pub at: DateTime<Utc>,
}

impl CacheEvent {
    pub fn new(kind: CacheEventKind, key: Option<String>) -> Self {
        Self {
            kind,
            key,
            at: Utc::now(),
        }
    }
}

// == Listeners ==

/// Handle returned by [`EventBus::on`], used to unregister the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(&CacheEvent) + Send + Sync>;

/// Registry of per-kind listeners.
///
/// `emit` clones the listener list out of the lock before invoking anything,
/// so a listener may register or unregister listeners without deadlocking.
#[derive(Default)]
pub struct EventBus {
    next_id: AtomicU64,
    listeners: RwLock<HashMap<CacheEventKind, Vec<(ListenerId, Listener)>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `listener` for events of `kind`.
    pub fn on<F>(&self, kind: CacheEventKind, listener: F) -> ListenerId
    where
        F: Fn(&CacheEvent) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut listeners = self
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        listeners
            .entry(kind)
            .or_default()
            .push((id, Arc::new(listener)));
        id
    }

    /// Unregisters a listener. Returns whether anything was removed, so
    /// unregistering twice is harmless.
    pub fn off(&self, kind: CacheEventKind, id: ListenerId) -> bool {
        let mut listeners = self
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(registered) = listeners.get_mut(&kind) else {
            return false;
        };
        let before = registered.len();
        registered.retain(|(registered_id, _)| *registered_id != id);
        before != registered.len()
    }

    /// Number of listeners currently registered for `kind`.
    pub fn listener_count(&self, kind: CacheEventKind) -> usize {
        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        listeners.get(&kind).map_or(0, Vec::len)
    }

    /// Invokes every listener registered for the event's kind, in the order
    /// they were registered.
    pub fn emit(&self, event: &CacheEvent) {
        let snapshot: Vec<Listener> = {
            let listeners = self
                .listeners
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            match listeners.get(&event.kind) {
                Some(registered) => registered.iter().map(|(_, l)| Arc::clone(l)).collect(),
                None => return,
            }
        };
        for listener in snapshot {
            listener(event);
        }
    }
}

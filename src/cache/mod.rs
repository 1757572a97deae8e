//! Cache Core Module
//!
//! The pieces shared by every storage backend: the entry envelope, the
//! access-order structure, the eviction policy rules, the entry codec, and
//! performance counters.

mod codec;
mod entry;
mod order;
pub mod policy;
mod stats;


// Re-export public types
pub use codec::{EntryCodec, JsonCodec};
pub use entry::{current_timestamp_ms, CacheEntry, StoredEntry};
pub use order::AccessOrder;
pub use stats::CacheStats;

// == Public Constants ==
/// Reserved name for the persisted access-order document.
///
/// The key/value backend stores it under `prefix + ACCESS_ORDER_KEY`; the
/// file backend as `ACCESS_ORDER_KEY + ".json"`. The name is reserved:
/// caching a value under this exact key is not supported on the key/value
/// backend, where it would overwrite the order document.
pub const ACCESS_ORDER_KEY: &str = "__access_order";

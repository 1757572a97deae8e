//! Entry Codec Module
//!
//! Serialization hook for the persistent backends.
//!
//! Both persistent backends store entries as strings; the codec decides the
//! string format. The default is JSON via serde_json, but callers can supply
//! their own encode/decode pair (a different wire format, say) through the
//! adapters' `with_codec` builders. Encode failures surface from `set`;
//! decode failures are the malformed-data path and degrade to a miss.

use crate::cache::StoredEntry;
use crate::error::{CacheError, Result};

// == Entry Codec ==
/// Encode/decode pair turning a stored entry into its persisted string form.
pub trait EntryCodec: Send + Sync {
    /// Serializes an entry envelope to its stored string form.
    fn encode(&self, entry: &StoredEntry) -> Result<String>;

    /// Parses a stored string back into an entry envelope.
    fn decode(&self, raw: &str) -> Result<StoredEntry>;
}

// == JSON Codec ==
/// Default codec: one JSON document per entry.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl EntryCodec for JsonCodec {
    fn encode(&self, entry: &StoredEntry) -> Result<String> {
        serde_json::to_string(entry)
            .map_err(|e| CacheError::codec(format!("key '{}'", entry.key), e))
    }

    fn decode(&self, raw: &str) -> Result<StoredEntry> {
        serde_json::from_str(raw).map_err(|e| CacheError::codec("stored entry", e))
    }
}

//! Access Order Module
//!
//! Tracks key recency for LRU eviction.
//!
//! Every key in a namespace appears exactly once, oldest-first; the head is
//! always the next eviction candidate. Keys are indexed by a monotonically
//! increasing recency stamp, so membership checks, inserts, promotions, and
//! head removal all avoid walking the full sequence. The structure
//! serializes as a plain JSON array of keys (oldest first), which is the
//! document format the persistent backends store.

use std::collections::{BTreeMap, HashMap};

use serde::de::{Deserializer, SeqAccess, Visitor};
use serde::ser::{SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};

// == Access Order ==
/// Ordered set of distinct keys recording recency of last read or write.
#[derive(Debug, Default, Clone)]
pub struct AccessOrder {
    /// Next recency stamp to hand out
    next_stamp: u64,
    /// Key to its current stamp
    index: HashMap<String, u64>,
    /// Stamp to key, ascending = oldest first
    queue: BTreeMap<u64, String>,
}

impl AccessOrder {
    // == Constructor ==
    /// Creates a new empty access order.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds an access order from a key sequence, oldest first.
    ///
    /// Duplicate keys collapse to their last occurrence, so a corrupted
    /// persisted sequence still yields a valid exactly-once ordering.
    pub fn from_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut order = Self::new();
        for key in keys {
            order.touch(&key.into());
        }
        order
    }

    // == Touch ==
    /// Marks a key as most recently used, inserting it if untracked.
    pub fn touch(&mut self, key: &str) {
        if let Some(stamp) = self.index.remove(key) {
            self.queue.remove(&stamp);
        }
        let stamp = self.next_stamp;
        self.next_stamp += 1;
        self.index.insert(key.to_string(), stamp);
        self.queue.insert(stamp, key.to_string());
    }

    // == Remove ==
    /// Removes a key from the order. Returns whether it was tracked.
    pub fn remove(&mut self, key: &str) -> bool {
        match self.index.remove(key) {
            Some(stamp) => {
                self.queue.remove(&stamp);
                true
            }
            None => false,
        }
    }

    // == Evict Oldest ==
    /// Removes and returns the least recently used key.
    ///
    /// Returns None if the order is empty.
    pub fn evict_oldest(&mut self) -> Option<String> {
        let (&stamp, _) = self.queue.iter().next()?;
        let key = self.queue.remove(&stamp)?;
        self.index.remove(&key);
        Some(key)
    }

    // == Peek Oldest ==
    /// Returns the least recently used key without removing it.
    pub fn peek_oldest(&self) -> Option<&str> {
        self.queue.values().next().map(String::as_str)
    }

    // == Contains ==
    /// Checks if a key is being tracked.
    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    // == Length ==
    /// Returns the number of tracked keys.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Returns true if no keys are tracked.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    // == Clear ==
    /// Drops every tracked key.
    pub fn clear(&mut self) {
        self.index.clear();
        self.queue.clear();
    }

    // == Keys ==
    /// Iterates tracked keys, oldest first.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.queue.values().map(String::as_str)
    }
}

// == Serde (persisted document format) ==
impl Serialize for AccessOrder {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.queue.len()))?;
        for key in self.queue.values() {
            seq.serialize_element(key)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for AccessOrder {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct KeySeqVisitor;

        impl<'de> Visitor<'de> for KeySeqVisitor {
            type Value = AccessOrder;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("a sequence of cache keys, oldest first")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let mut order = AccessOrder::new();
                while let Some(key) = seq.next_element::<String>()? {
                    order.touch(&key);
                }
                Ok(order)
            }
        }

        deserializer.deserialize_seq(KeySeqVisitor)
    }
}

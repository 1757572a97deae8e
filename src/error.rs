//! Error types for the cache
//!
//! Provides unified error handling using thiserror.
//!
//! A missing, expired, or unreadable entry is never an error: lookups report
//! "no value" and corrupt data is purged silently. Errors are reserved for
//! genuine storage failures on the write path.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for cache operations.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Backing store rejected a write even after a repair-and-retry cycle
    #[error("Storage full: {0}")]
    StorageFull(String),

    /// Entry could not be encoded for persistence, or read back
    #[error("Codec error for {context}: {reason}")]
    Codec {
        /// What was being encoded or decoded (a key, or a storage location)
        context: String,
        /// Human-readable cause from the codec
        reason: String,
    },

    /// Underlying filesystem operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CacheError {
    /// Builds a codec error from any displayable cause.
    pub fn codec(context: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        CacheError::Codec {
            context: context.into(),
            reason: reason.to_string(),
        }
    }
}

// == Result Type Alias ==
/// Convenience Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;

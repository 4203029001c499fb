//! Error taxonomy for smoldb
//!
//! Every fallible operation in the crate returns [`StoreError`]. Local
//! recovery (skipping a torn WAL tail, restoring with no checkpoint on
//! disk) never surfaces here; storage failures always do. Nothing in
//! this crate is fatal to the process — terminating on an unrecoverable
//! startup failure is caller policy.

use thiserror::Error;

/// Result type alias using StoreError
pub type Result<T> = std::result::Result<T, StoreError>;

/// Unified error type for store operations
#[derive(Debug, Error)]
pub enum StoreError {
    /// The named key has no backing document
    #[error("key '{0}' not found")]
    NotFound(String),

    /// Filesystem failure on read/write/remove
    #[error("storage I/O failure: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed JSON content, WAL line or checkpoint file
    #[error("corrupt data: {0}")]
    Corrupt(String),

    /// Stored checksum disagrees with the current content
    #[error("checksum mismatch for key '{key}': stored={stored}, calculated={calculated}")]
    IntegrityMismatch {
        key: String,
        stored: String,
        calculated: String,
    },

    /// A lock guard was poisoned by a panicking holder
    #[error("lock poisoned: {0}")]
    LockPoisoned(&'static str),
}

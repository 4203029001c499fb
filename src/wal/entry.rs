//! WAL entry format
//!
//! Each entry is one JSON object per line in `.smoldb/wal.log`:
//!
//! ```json
//! {"v":1,"op":"PUT","key":"users","body":"{\"name\":\"alice\"}","ts":1700000000000000000,"csum":2870114921}
//! ```
//!
//! Entries are append-only and totally ordered by file order. The
//! checksum is an FNV-1a fold over op, key and body; it detects torn or
//! bit-rotted lines during replay.

use serde::{Deserialize, Serialize};

use crate::clock;

/// Entry format version stamped into every line.
pub const WAL_VERSION: u32 = 1;

/// Logged operation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WalOp {
    /// Full-content replacement of a key
    #[serde(rename = "PUT")]
    Put,
    /// Removal of a key
    #[serde(rename = "DELETE")]
    Delete,
    /// Durability boundary marker, written before each sync point
    #[serde(rename = "COMMIT")]
    Commit,
}

impl WalOp {
    /// Wire name of the operation, as folded into the checksum.
    pub fn as_str(self) -> &'static str {
        match self {
            WalOp::Put => "PUT",
            WalOp::Delete => "DELETE",
            WalOp::Commit => "COMMIT",
        }
    }
}

/// One WAL line.
///
/// `body` is present for PUT entries (the full new content) and absent
/// for DELETE and COMMIT.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalEntry {
    /// Format version
    pub v: u32,
    /// Operation kind
    pub op: WalOp,
    /// Target key (empty for COMMIT markers)
    #[serde(default)]
    pub key: String,
    /// Full new content for PUT entries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Unix nanoseconds at append time
    pub ts: i64,
    /// FNV-1a fold over op, key and body
    pub csum: u32,
}

impl WalEntry {
    /// Builds an entry stamped with the current version, timestamp and
    /// checksum.
    pub fn stamped(op: WalOp, key: impl Into<String>, body: Option<String>) -> Self {
        let key = key.into();
        let csum = fold_checksum(op, &key, body.as_deref().unwrap_or(""));
        Self {
            v: WAL_VERSION,
            op,
            key,
            body,
            ts: clock::now_nanos(),
            csum,
        }
    }

    /// Whether the stored checksum matches the entry's own fields.
    pub fn checksum_matches(&self) -> bool {
        self.csum == fold_checksum(self.op, &self.key, self.body.as_deref().unwrap_or(""))
    }
}

/// FNV-1a fold over op + key + body.
pub fn fold_checksum(op: WalOp, key: &str, body: &str) -> u32 {
    const OFFSET: u32 = 2166136261;
    const PRIME: u32 = 16777619;

    let mut sum = OFFSET;
    for b in op
        .as_str()
        .bytes()
        .chain(key.bytes())
        .chain(body.bytes())
    {
        sum ^= u32::from(b);
        sum = sum.wrapping_mul(PRIME);
    }
    sum
}

//! Content checksums and integrity verification
//!
//! Every document carries a metadata sidecar recording an xxHash64
//! checksum of its content. Validation recomputes and compares — a
//! mismatch is reported, never auto-corrected. Repair is the explicit
//! opposite: it re-certifies whatever bytes are currently on disk.
//!
//! Verification across the whole store fans out one thread per key;
//! each thread takes only its own document's lock, and only the
//! result-list append is serialized.

use std::fs;
use std::path::Path;
use std::sync::Mutex;
use std::thread;

use serde::{Deserialize, Serialize};
use xxhash_rust::xxh64::xxh64;

use crate::clock;
use crate::document::Document;
use crate::error::{Result, StoreError};
use crate::index::Index;

/// Metadata stored alongside each document at `<key>.json.meta`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// xxHash64 of the content, 16 hex digits
    pub checksum: String,
    /// RFC3339 timestamp of first write
    pub created: String,
    /// RFC3339 timestamp of last content replacement
    pub modified: String,
}

/// Computes the xxHash64 checksum of the given bytes as 16 hex digits.
pub fn calculate_checksum(data: &[u8]) -> String {
    format!("{:016x}", xxh64(data, 0))
}

/// Reads a metadata sidecar. Does not take the document lock.
pub(crate) fn read_metadata_raw(path: &Path) -> Result<Metadata> {
    let bytes = fs::read(path)?;
    serde_json::from_slice(&bytes).map_err(|e| {
        StoreError::Corrupt(format!("metadata file {} is malformed: {}", path.display(), e))
    })
}

/// Writes a metadata sidecar. Does not take the document lock.
pub(crate) fn write_metadata_raw(path: &Path, meta: &Metadata) -> Result<()> {
    let bytes = serde_json::to_vec(meta)
        .map_err(|e| StoreError::Corrupt(format!("failed to encode metadata: {}", e)))?;
    fs::write(path, bytes)?;
    Ok(())
}

impl Document {
    /// Reads the metadata sidecar under the document's read lock.
    pub fn read_metadata(&self, dir: &Path) -> Result<Metadata> {
        let _guard = self
            .lock
            .read()
            .map_err(|_| StoreError::LockPoisoned("document metadata"))?;
        read_metadata_raw(&self.metadata_path(dir))
    }

    /// Recomputes the content checksum and compares it to the stored one.
    ///
    /// Content and sidecar are read under a single lock acquisition so a
    /// concurrent content replacement cannot interleave between the two
    /// reads.
    ///
    /// # Errors
    ///
    /// `IntegrityMismatch` on disagreement; `NotFound`/`Io`/`Corrupt` if
    /// either file cannot be read.
    pub fn validate_checksum(&self, dir: &Path) -> Result<()> {
        let _guard = self
            .lock
            .read()
            .map_err(|_| StoreError::LockPoisoned("document metadata"))?;

        let bytes = self.read_content_raw(dir)?;
        let meta = read_metadata_raw(&self.metadata_path(dir))?;

        let calculated = calculate_checksum(&bytes);
        if calculated != meta.checksum {
            return Err(StoreError::IntegrityMismatch {
                key: self.key().to_string(),
                stored: meta.checksum,
                calculated,
            });
        }
        Ok(())
    }

    /// Overwrites the stored checksum to match the current content.
    ///
    /// This re-certifies whatever bytes are on disk; it never restores
    /// lost content. A missing sidecar is recreated with the current
    /// time as both timestamps.
    pub fn repair_checksum(&self, dir: &Path) -> Result<()> {
        let _guard = self
            .lock
            .write()
            .map_err(|_| StoreError::LockPoisoned("document metadata"))?;

        let bytes = self.read_content_raw(dir)?;
        let meta_path = self.metadata_path(dir);
        let mut meta = match read_metadata_raw(&meta_path) {
            Ok(existing) => existing,
            Err(_) => {
                let now = clock::now_rfc3339();
                Metadata {
                    checksum: String::new(),
                    created: now.clone(),
                    modified: now,
                }
            }
        };
        meta.checksum = calculate_checksum(&bytes);
        write_metadata_raw(&meta_path, &meta)
    }
}

/// Result of verifying a single key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyOutcome {
    pub key: String,
    pub status: VerifyStatus,
}

/// Per-key verification status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyStatus {
    /// Content matches its stored checksum
    Valid,
    /// Content disagrees with its stored checksum
    Mismatch { stored: String, calculated: String },
    /// Content or sidecar could not be read
    Unreadable(String),
}

/// Verifies every key in the index concurrently.
///
/// One thread per key; each acquires only that document's lock, so
/// verification of independent keys proceeds in parallel. Returns one
/// outcome per key regardless of scheduling.
pub fn verify_all(index: &Index) -> Result<Vec<VerifyOutcome>> {
    let keys = index.list_keys();
    let results = Mutex::new(Vec::with_capacity(keys.len()));

    thread::scope(|s| {
        for key in keys {
            let results = &results;
            s.spawn(move || {
                let status = match index.lookup(&key) {
                    Some(doc) => match doc.validate_checksum(index.dir()) {
                        Ok(()) => VerifyStatus::Valid,
                        Err(StoreError::IntegrityMismatch {
                            stored, calculated, ..
                        }) => VerifyStatus::Mismatch { stored, calculated },
                        Err(e) => VerifyStatus::Unreadable(e.to_string()),
                    },
                    None => VerifyStatus::Unreadable("key no longer in index".to_string()),
                };
                if let Ok(mut guard) = results.lock() {
                    guard.push(VerifyOutcome { key, status });
                }
            });
        }
    });

    results
        .into_inner()
        .map_err(|_| StoreError::LockPoisoned("verification results"))
}

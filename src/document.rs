//! Document content storage
//!
//! A [`Document`] is one named JSON blob stored at `<dir>/<key>.json`
//! with a metadata sidecar at `<dir>/<key>.json.meta`. The struct itself
//! holds no content; it is the unit of content-level locking, shared via
//! `Arc` from the index map.
//!
//! # Lock discipline
//!
//! The per-document lock serializes content I/O *and* sidecar I/O: every
//! public operation acquires it exactly once, and the raw file helpers
//! it calls never re-acquire it. One document's I/O therefore never
//! blocks unrelated lookups once the index-level lock has been released.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde_json::Value;
use tracing::debug;

use crate::clock;
use crate::error::{Result, StoreError};
use crate::integrity::{self, Metadata};

/// A single JSON document, addressed by key.
///
/// The key is the filename without the `.json` extension. Instances are
/// cheap: content lives on disk and is read on demand.
#[derive(Debug)]
pub struct Document {
    key: String,
    /// Serializes content and sidecar I/O for this document.
    pub(crate) lock: RwLock<()>,
}

impl Document {
    /// Creates a handle for the named key. Performs no I/O.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            lock: RwLock::new(()),
        }
    }

    /// The document's key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Path of the backing content file under `dir`.
    pub fn content_path(&self, dir: &Path) -> PathBuf {
        dir.join(format!("{}.json", self.key))
    }

    /// Path of the metadata sidecar under `dir`.
    pub fn metadata_path(&self, dir: &Path) -> PathBuf {
        dir.join(format!("{}.json.meta", self.key))
    }

    /// Reads the full content bytes.
    ///
    /// # Errors
    ///
    /// `NotFound` if the backing file is absent, `Io` on any other
    /// filesystem failure.
    pub fn read_content(&self, dir: &Path) -> Result<Vec<u8>> {
        let _guard = self
            .lock
            .read()
            .map_err(|_| StoreError::LockPoisoned("document content"))?;
        self.read_content_raw(dir)
    }

    /// Reads the content and decodes it as a JSON value.
    ///
    /// # Errors
    ///
    /// `Corrupt` if the bytes are not valid JSON.
    pub fn read_value(&self, dir: &Path) -> Result<Value> {
        let bytes = self.read_content(dir)?;
        serde_json::from_slice(&bytes).map_err(|e| {
            StoreError::Corrupt(format!("key '{}' cannot be parsed into json: {}", self.key, e))
        })
    }

    /// Replaces the entire content and rewrites the metadata sidecar.
    ///
    /// The sidecar records the new content checksum and modification
    /// time; the creation time is carried over from an existing sidecar,
    /// or set to the modification time for a new document.
    pub fn replace_content(&self, dir: &Path, bytes: &[u8]) -> Result<()> {
        let _guard = self
            .lock
            .write()
            .map_err(|_| StoreError::LockPoisoned("document content"))?;

        fs::write(self.content_path(dir), bytes)?;

        let modified = clock::now_rfc3339();
        let created = match integrity::read_metadata_raw(&self.metadata_path(dir)) {
            Ok(existing) => existing.created,
            Err(_) => modified.clone(),
        };
        let meta = Metadata {
            checksum: integrity::calculate_checksum(bytes),
            created,
            modified,
        };
        integrity::write_metadata_raw(&self.metadata_path(dir), &meta)
    }

    /// Removes the backing content file and its sidecar.
    ///
    /// # Errors
    ///
    /// `NotFound` if the content file is already absent. A sidecar that
    /// fails to unlink is logged and ignored; it carries no authority
    /// without its content file.
    pub fn remove(&self, dir: &Path) -> Result<()> {
        let _guard = self
            .lock
            .write()
            .map_err(|_| StoreError::LockPoisoned("document content"))?;

        fs::remove_file(self.content_path(dir)).map_err(|e| self.map_not_found(e))?;

        if let Err(e) = fs::remove_file(self.metadata_path(dir)) {
            if e.kind() != ErrorKind::NotFound {
                debug!(key = %self.key, error = %e, "failed to remove metadata sidecar");
            }
        }
        Ok(())
    }

    pub(crate) fn read_content_raw(&self, dir: &Path) -> Result<Vec<u8>> {
        fs::read(self.content_path(dir)).map_err(|e| self.map_not_found(e))
    }

    fn map_not_found(&self, e: std::io::Error) -> StoreError {
        if e.kind() == ErrorKind::NotFound {
            StoreError::NotFound(self.key.clone())
        } else {
            StoreError::Io(e)
        }
    }
}

//! The document index
//!
//! One [`Index`] instance orchestrates a database directory: it owns the
//! in-memory key→document map, the optional WAL, and the checkpoint
//! mechanism. It is the sole entry point that mutates state. There is no
//! ambient global — construct one and pass it to whatever serves
//! requests.
//!
//! # Lock discipline
//!
//! The index-level `RwLock` guards the map itself: read mode for
//! `lookup`/`list_keys`, write mode for `put`/`delete`/`regenerate`/
//! replay/restore (and read mode for checkpoint creation, which only
//! walks the map). Per-document locks serialize each document's own
//! file I/O independently, so one document's disk work never blocks
//! unrelated lookups once the map lock is released.
//!
//! # Ordering
//!
//! For a given key: WAL append happens-before the content mutation
//! happens-before the map update becomes visible to `lookup`. Callers
//! never observe a map entry whose WAL record is missing. No ordering
//! is promised across different keys.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

use tracing::{info, warn};

use crate::checkpoint::{
    find_latest, read_snapshot, snapshot_file_name, write_snapshot, CheckpointMeta,
    CHECKPOINT_DIR,
};
use crate::clock;
use crate::document::Document;
use crate::error::{Result, StoreError};
use crate::wal::{replay_log, ReplayStats, ReplayTarget, Wal, WalOp, WalOptions};

type DocumentMap = HashMap<String, Arc<Document>>;

/// Process-wide index over one database directory.
#[derive(Debug)]
pub struct Index {
    dir: PathBuf,
    documents: RwLock<DocumentMap>,
    wal: Option<Wal>,
}

impl Index {
    /// Creates an index over `dir` with an empty map and no WAL.
    ///
    /// Call [`regenerate`](Self::regenerate) to populate the map and
    /// [`init_wal`](Self::init_wal) to enable durability logging.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            documents: RwLock::new(HashMap::new()),
            wal: None,
        }
    }

    /// The storage root this index manages.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Opens the WAL with the given options.
    pub fn init_wal(&mut self, options: WalOptions) -> Result<()> {
        self.wal = Some(Wal::open(&self.dir, options)?);
        Ok(())
    }

    /// Whether a WAL is initialized.
    pub fn wal_available(&self) -> bool {
        self.wal.is_some()
    }

    /// Retrieves the document registered under `key`.
    pub fn lookup(&self, key: &str) -> Option<Arc<Document>> {
        let map = self.documents.read().ok()?;
        map.get(key).cloned()
    }

    /// All registered keys, in no particular order.
    pub fn list_keys(&self) -> Vec<String> {
        self.documents
            .read()
            .map(|map| map.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Registers `key` with the given full content.
    ///
    /// Appends a PUT intent to the WAL, replaces the on-disk content,
    /// and registers the key — all under the map's write lock, so the
    /// entry becomes visible only with its WAL record already on disk.
    ///
    /// # Errors
    ///
    /// WAL append and storage failures abort the operation and
    /// propagate. The WAL entry (if written) re-applies on replay; that
    /// is the intended recovery path for partial failures.
    pub fn put(&self, key: &str, content: &[u8]) -> Result<()> {
        let mut map = self.write_map()?;

        if let Some(wal) = &self.wal {
            wal.append(
                WalOp::Put,
                key,
                Some(String::from_utf8_lossy(content).into_owned()),
            )?;
        }

        let doc = map
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Document::new(key)))
            .clone();
        doc.replace_content(&self.dir, content)?;
        Ok(())
    }

    /// Removes `key`: WAL intent, backing content, then the map entry.
    ///
    /// The key stays registered if content removal fails, so the state
    /// remains visible for a retry or for replay to settle.
    pub fn delete(&self, key: &str) -> Result<()> {
        let mut map = self.write_map()?;

        if let Some(wal) = &self.wal {
            wal.append(WalOp::Delete, key, None)?;
        }

        let doc = map
            .get(key)
            .cloned()
            .unwrap_or_else(|| Arc::new(Document::new(key)));
        doc.remove(&self.dir)?;
        map.remove(key);
        Ok(())
    }

    /// Rebuilds the map from a directory scan, discarding the prior map.
    ///
    /// Registers every `*.json` file by its basename. Returns the
    /// number of keys found.
    pub fn regenerate(&self) -> Result<usize> {
        let start = Instant::now();
        info!(dir = %self.dir.display(), "building index");

        let keys = crawl_directory(&self.dir)?;
        let mut map = self.write_map()?;
        *map = keys
            .into_iter()
            .map(|key| {
                let doc = Arc::new(Document::new(key.clone()));
                (key, doc)
            })
            .collect();

        info!(
            files = map.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "index built"
        );
        Ok(map.len())
    }

    /// Switches the storage root and rebuilds the map.
    pub fn regenerate_with_dir(&mut self, dir: impl Into<PathBuf>) -> Result<usize> {
        self.dir = dir.into();
        self.regenerate()
    }

    /// Replays the WAL to bring files and map to a consistent state.
    ///
    /// A no-op without a WAL. Always scans from the start of the log;
    /// replay is idempotent, so re-applying an already-settled prefix is
    /// safe. The offset recorded by a checkpoint restore is available
    /// via [`replay_resume_offset`](Self::replay_resume_offset) but is
    /// deliberately not consulted here.
    pub fn wal_replay(&self) -> Result<ReplayStats> {
        let Some(wal) = &self.wal else {
            return Ok(ReplayStats::default());
        };
        let mut map = self.write_map()?;
        let mut target = MapReplayTarget {
            dir: &self.dir,
            documents: &mut map,
        };
        replay_log(wal.path(), &mut target)
    }

    /// The WAL offset recorded by the most recent checkpoint restore,
    /// or 0.
    pub fn replay_resume_offset(&self) -> u64 {
        self.wal.as_ref().map(Wal::resume_offset).unwrap_or(0)
    }

    /// Snapshots every registered document plus the current WAL offset
    /// into a new timestamp-named checkpoint file.
    ///
    /// After a successful write the WAL is truncated at the recorded
    /// offset; a truncation failure is logged, not fatal — a
    /// longer-than-necessary log is safe, just wasteful.
    ///
    /// Returns the snapshot path.
    pub fn create_checkpoint(&self) -> Result<PathBuf> {
        let map = self.read_map()?;

        let checkpoint_dir = self.dir.join(CHECKPOINT_DIR);
        fs::create_dir_all(&checkpoint_dir)?;

        let ts = clock::now_nanos();
        let mut meta = CheckpointMeta::new(ts);
        for (key, doc) in map.iter() {
            match doc.read_content(&self.dir) {
                Ok(bytes) => {
                    meta.keys
                        .insert(key.clone(), String::from_utf8_lossy(&bytes).into_owned());
                }
                Err(e) => warn!(key = %key, error = %e, "checkpoint: failed to read key"),
            }
        }
        if let Some(wal) = &self.wal {
            meta.wal_offset = wal.offset()?;
        }

        let path = checkpoint_dir.join(snapshot_file_name(ts));
        write_snapshot(&path, &meta)?;
        info!(snapshot = %path.display(), keys = meta.keys.len(), "checkpoint created");

        if let Some(wal) = &self.wal {
            if meta.wal_offset > 0 {
                if let Err(e) = wal.truncate_at(meta.wal_offset) {
                    warn!(error = %e, "checkpoint: failed to truncate WAL");
                }
            }
        }
        Ok(path)
    }

    /// Replaces the entire in-memory document set from the latest
    /// checkpoint, rewriting each document's backing content.
    ///
    /// A no-op when no checkpoint exists. Records the snapshot's WAL
    /// offset so callers know where meaningful log history begins.
    pub fn restore_from_checkpoint(&self) -> Result<()> {
        let mut map = self.write_map()?;

        let Some(path) = find_latest(&self.dir)? else {
            return Ok(());
        };
        let meta = read_snapshot(&path)?;
        info!(snapshot = %path.display(), keys = meta.keys.len(), "restoring from checkpoint");

        map.clear();
        for (key, content) in &meta.keys {
            let doc = Arc::new(Document::new(key.clone()));
            if let Err(e) = doc.replace_content(&self.dir, content.as_bytes()) {
                warn!(key = %key, error = %e, "checkpoint: failed to restore key");
                continue;
            }
            map.insert(key.clone(), doc);
        }

        if let Some(wal) = &self.wal {
            wal.set_resume_offset(meta.wal_offset);
        }
        Ok(())
    }

    fn read_map(&self) -> Result<RwLockReadGuard<'_, DocumentMap>> {
        self.documents
            .read()
            .map_err(|_| StoreError::LockPoisoned("document map"))
    }

    fn write_map(&self) -> Result<RwLockWriteGuard<'_, DocumentMap>> {
        self.documents
            .write()
            .map_err(|_| StoreError::LockPoisoned("document map"))
    }
}

/// Applies replayed WAL entries to the live map and backing files.
///
/// Apply failures are logged and tolerated: a later entry for the same
/// key may supersede the failed one, and a follow-up `regenerate` will
/// settle any drift.
struct MapReplayTarget<'a> {
    dir: &'a Path,
    documents: &'a mut DocumentMap,
}

impl ReplayTarget for MapReplayTarget<'_> {
    fn apply_put(&mut self, key: &str, body: &str) {
        let doc = self
            .documents
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Document::new(key)))
            .clone();
        if let Err(e) = doc.replace_content(self.dir, body.as_bytes()) {
            warn!(key, error = %e, "wal: put apply failed");
        }
    }

    fn apply_delete(&mut self, key: &str) {
        let doc = self
            .documents
            .remove(key)
            .unwrap_or_else(|| Arc::new(Document::new(key)));
        match doc.remove(self.dir) {
            Ok(()) | Err(StoreError::NotFound(_)) => {}
            Err(e) => warn!(key, error = %e, "wal: delete apply failed"),
        }
    }
}

/// Scans a directory for `*.json` files, returning their basenames.
fn crawl_directory(dir: &Path) -> Result<Vec<String>> {
    let mut keys = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            keys.push(stem.to_string());
        }
    }
    Ok(keys)
}

//! Checkpoint snapshots
//!
//! A checkpoint is a full copy of every document's content plus a
//! bookmark of how much WAL history it already incorporates. Snapshots
//! live under `<dir>/checkpoint/` as one JSON object per file, named by
//! a zero-padded nanosecond timestamp: `<19-digit ts>.snap`. "Latest"
//! is simply the highest timestamp.
//!
//! The index drives checkpoint creation and restoration (it owns the
//! locks); this module owns the snapshot format and file discovery.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

/// Directory holding snapshots, relative to the database directory.
pub const CHECKPOINT_DIR: &str = "checkpoint";

/// Snapshot filename extension.
const SNAP_EXT: &str = "snap";

/// Minimum digit count of a snapshot timestamp stem.
const MIN_TS_DIGITS: usize = 19;

/// One snapshot: a timestamp, every document's full content, and the
/// WAL byte offset at snapshot time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointMeta {
    /// Nanosecond timestamp, also the filename stem
    #[serde(rename = "ts")]
    pub timestamp: i64,
    /// Key to full document content
    pub keys: BTreeMap<String, String>,
    /// Byte offset into the WAL at snapshot time
    #[serde(rename = "walOffset")]
    pub wal_offset: u64,
}

impl CheckpointMeta {
    /// An empty snapshot at the given timestamp.
    pub fn new(timestamp: i64) -> Self {
        Self {
            timestamp,
            keys: BTreeMap::new(),
            wal_offset: 0,
        }
    }
}

/// Filename for a snapshot taken at `timestamp`.
pub fn snapshot_file_name(timestamp: i64) -> String {
    format!("{:019}.{}", timestamp, SNAP_EXT)
}

/// Finds the snapshot with the highest timestamp under
/// `<dir>/checkpoint/`.
///
/// Returns `None` when the directory is missing or holds no valid
/// snapshot — a fresh database has no checkpoint.
pub fn find_latest(dir: &Path) -> Result<Option<PathBuf>> {
    let checkpoint_dir = dir.join(CHECKPOINT_DIR);
    let entries = match fs::read_dir(&checkpoint_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let mut latest: Option<(i64, PathBuf)> = None;
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(ts) = parse_snapshot_timestamp(&path) else {
            continue;
        };
        if latest.as_ref().map_or(true, |(best, _)| ts > *best) {
            latest = Some((ts, path));
        }
    }
    Ok(latest.map(|(_, path)| path))
}

/// Extracts the timestamp from a `<19-digit-or-more ts>.snap` filename.
fn parse_snapshot_timestamp(path: &Path) -> Option<i64> {
    if path.extension()?.to_str()? != SNAP_EXT {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    if stem.len() < MIN_TS_DIGITS || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    stem.parse().ok()
}

/// Reads and decodes a snapshot file.
pub fn read_snapshot(path: &Path) -> Result<CheckpointMeta> {
    let file = File::open(path)?;
    serde_json::from_reader(file).map_err(|e| {
        StoreError::Corrupt(format!(
            "checkpoint file {} is malformed: {}",
            path.display(),
            e
        ))
    })
}

/// Writes a snapshot file and syncs it to disk.
pub fn write_snapshot(path: &Path, meta: &CheckpointMeta) -> Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer(&file, meta)
        .map_err(|e| StoreError::Corrupt(format!("failed to encode checkpoint: {}", e)))?;
    file.sync_all()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn snap_path(dir: &Path, ts: i64) -> PathBuf {
        dir.join(CHECKPOINT_DIR).join(snapshot_file_name(ts))
    }

    fn write_empty_snap(dir: &Path, ts: i64) {
        fs::create_dir_all(dir.join(CHECKPOINT_DIR)).unwrap();
        write_snapshot(&snap_path(dir, ts), &CheckpointMeta::new(ts)).unwrap();
    }

    #[test]
    fn file_name_is_zero_padded_to_nineteen_digits() {
        let name = snapshot_file_name(42);
        assert_eq!(name, "0000000000000000042.snap");
    }

    #[test]
    fn missing_directory_means_no_checkpoint() {
        let tmp = TempDir::new().unwrap();
        assert!(find_latest(tmp.path()).unwrap().is_none());
    }

    #[test]
    fn latest_picks_highest_timestamp() {
        let tmp = TempDir::new().unwrap();
        write_empty_snap(tmp.path(), 100);
        write_empty_snap(tmp.path(), 300);
        write_empty_snap(tmp.path(), 200);

        let latest = find_latest(tmp.path()).unwrap().unwrap();
        assert_eq!(latest, snap_path(tmp.path(), 300));
    }

    #[test]
    fn non_snapshot_files_are_ignored() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join(CHECKPOINT_DIR);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("notes.txt"), "not a snapshot").unwrap();
        fs::write(dir.join("12345.snap"), "{}").unwrap(); // stem too short

        assert!(find_latest(tmp.path()).unwrap().is_none());
    }

    #[test]
    fn snapshot_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let mut meta = CheckpointMeta::new(1234567890123456789);
        meta.keys.insert("users".to_string(), "{\"a\":1}".to_string());
        meta.wal_offset = 77;

        let path = tmp.path().join(snapshot_file_name(meta.timestamp));
        write_snapshot(&path, &meta).unwrap();
        assert_eq!(read_snapshot(&path).unwrap(), meta);
    }

    #[test]
    fn malformed_snapshot_is_corrupt() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(snapshot_file_name(1111111111111111111));
        fs::write(&path, "{oops").unwrap();
        assert!(matches!(
            read_snapshot(&path),
            Err(StoreError::Corrupt(_))
        ));
    }

    #[test]
    fn wire_field_names_are_stable() {
        let meta = CheckpointMeta::new(5);
        let json = serde_json::to_string(&meta).unwrap();
        assert!(json.contains("\"ts\":5"));
        assert!(json.contains("\"walOffset\":0"));
        assert!(json.contains("\"keys\":{}"));
    }
}

//! WAL replay
//!
//! Replay scans the log line by line and re-applies each operation to
//! bring storage and index back to a consistent state after a crash.
//!
//! The torn-tail rule: a line that fails to parse, or whose checksum
//! disagrees with its fields, halts replay at that point. Everything
//! after it is treated as the debris of a partial final write — not
//! applied, and not an error. Replay of full-content PUT entries is
//! idempotent, so re-scanning an already-applied prefix is always safe.

use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind};
use std::path::Path;

use tracing::warn;

use super::entry::{WalEntry, WalOp};
use crate::error::Result;

/// Seam between replay and the structure it rebuilds.
///
/// Apply failures are the target's concern: replay keeps going, since a
/// later entry for the same key may well supersede the failed one.
pub trait ReplayTarget {
    /// Re-apply a PUT: replace the key's content and register it.
    fn apply_put(&mut self, key: &str, body: &str);

    /// Re-apply a DELETE: remove the key's content and unregister it.
    fn apply_delete(&mut self, key: &str);
}

/// Counters describing one replay pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    /// PUT entries applied
    pub puts: u64,
    /// DELETE entries applied
    pub deletes: u64,
    /// COMMIT markers skipped
    pub commits: u64,
    /// Whether replay stopped early at a torn or corrupt line
    pub halted_at_corruption: bool,
}

impl ReplayStats {
    /// Total entries applied (markers excluded).
    pub fn applied(&self) -> u64 {
        self.puts + self.deletes
    }
}

/// Replays the log at `path` into `target`.
///
/// A missing log file is a fresh database, not an error.
pub fn replay_log<T: ReplayTarget>(path: &Path, target: &mut T) -> Result<ReplayStats> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(ReplayStats::default()),
        Err(e) => return Err(e.into()),
    };

    let mut stats = ReplayStats::default();
    for line in BufReader::new(file).lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let entry: WalEntry = match serde_json::from_str(line) {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, "wal: halting replay at malformed line");
                stats.halted_at_corruption = true;
                break;
            }
        };
        if !entry.checksum_matches() {
            warn!(key = %entry.key, "wal: halting replay at checksum-mismatched line");
            stats.halted_at_corruption = true;
            break;
        }

        match entry.op {
            WalOp::Put => {
                target.apply_put(&entry.key, entry.body.as_deref().unwrap_or(""));
                stats.puts += 1;
            }
            WalOp::Delete => {
                target.apply_delete(&entry.key);
                stats.deletes += 1;
            }
            WalOp::Commit => {
                stats.commits += 1;
            }
        }
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::fs;
    use std::io::Write;
    use tempfile::TempDir;

    /// In-memory target: enough to observe apply ordering.
    #[derive(Default)]
    struct MemTarget {
        state: BTreeMap<String, String>,
    }

    impl ReplayTarget for MemTarget {
        fn apply_put(&mut self, key: &str, body: &str) {
            self.state.insert(key.to_string(), body.to_string());
        }

        fn apply_delete(&mut self, key: &str) {
            self.state.remove(key);
        }
    }

    fn write_lines(dir: &Path, lines: &[String]) -> std::path::PathBuf {
        let path = dir.join("wal.log");
        let mut f = fs::File::create(&path).unwrap();
        for line in lines {
            writeln!(f, "{}", line).unwrap();
        }
        path
    }

    fn entry_line(op: WalOp, key: &str, body: Option<&str>) -> String {
        let entry = WalEntry::stamped(op, key, body.map(str::to_string));
        serde_json::to_string(&entry).unwrap()
    }

    #[test]
    fn missing_log_is_a_fresh_database() {
        let tmp = TempDir::new().unwrap();
        let mut target = MemTarget::default();
        let stats = replay_log(&tmp.path().join("absent.log"), &mut target).unwrap();
        assert_eq!(stats, ReplayStats::default());
        assert!(target.state.is_empty());
    }

    #[test]
    fn puts_and_deletes_replay_in_order() {
        let tmp = TempDir::new().unwrap();
        let path = write_lines(
            tmp.path(),
            &[
                entry_line(WalOp::Put, "a", Some("1")),
                entry_line(WalOp::Put, "b", Some("2")),
                entry_line(WalOp::Commit, "", None),
                entry_line(WalOp::Delete, "a", None),
                entry_line(WalOp::Put, "b", Some("3")),
            ],
        );

        let mut target = MemTarget::default();
        let stats = replay_log(&path, &mut target).unwrap();

        assert_eq!(stats.puts, 3);
        assert_eq!(stats.deletes, 1);
        assert_eq!(stats.commits, 1);
        assert_eq!(stats.applied(), 4);
        assert!(!stats.halted_at_corruption);
        assert_eq!(target.state.get("b").map(String::as_str), Some("3"));
        assert!(!target.state.contains_key("a"));
    }

    #[test]
    fn malformed_line_halts_replay_there() {
        let tmp = TempDir::new().unwrap();
        let path = write_lines(
            tmp.path(),
            &[
                entry_line(WalOp::Put, "kept", Some("1")),
                "{\"v\":1,\"op\":\"PUT\",\"key\":\"torn".to_string(),
                entry_line(WalOp::Put, "after", Some("2")),
            ],
        );

        let mut target = MemTarget::default();
        let stats = replay_log(&path, &mut target).unwrap();

        assert!(stats.halted_at_corruption);
        assert_eq!(stats.puts, 1);
        assert!(target.state.contains_key("kept"));
        assert!(!target.state.contains_key("after"));
    }

    #[test]
    fn checksum_mismatch_halts_replay_there() {
        let tmp = TempDir::new().unwrap();
        let mut tampered = WalEntry::stamped(WalOp::Put, "x", Some("real".to_string()));
        tampered.body = Some("swapped".to_string());
        let path = write_lines(
            tmp.path(),
            &[
                entry_line(WalOp::Put, "kept", Some("1")),
                serde_json::to_string(&tampered).unwrap(),
                entry_line(WalOp::Put, "after", Some("2")),
            ],
        );

        let mut target = MemTarget::default();
        let stats = replay_log(&path, &mut target).unwrap();

        assert!(stats.halted_at_corruption);
        assert_eq!(target.state.len(), 1);
    }

    #[test]
    fn replay_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let path = write_lines(
            tmp.path(),
            &[
                entry_line(WalOp::Put, "a", Some("1")),
                entry_line(WalOp::Delete, "gone", None),
            ],
        );

        let mut target = MemTarget::default();
        replay_log(&path, &mut target).unwrap();
        let first = target.state.clone();
        replay_log(&path, &mut target).unwrap();
        assert_eq!(first, target.state);
    }

    #[test]
    fn blank_lines_are_skipped() {
        let tmp = TempDir::new().unwrap();
        let path = write_lines(
            tmp.path(),
            &[
                String::new(),
                entry_line(WalOp::Put, "a", Some("1")),
                "   ".to_string(),
            ],
        );

        let mut target = MemTarget::default();
        let stats = replay_log(&path, &mut target).unwrap();
        assert_eq!(stats.puts, 1);
        assert!(!stats.halted_at_corruption);
    }
}

//! WAL crash recovery
//!
//! Each test simulates a crash by damaging on-disk state behind a
//! finished index, then drives a fresh index through the recovery
//! path over the same directory.

use std::fs::{self, OpenOptions};
use std::io::Write;

use smoldb::{DurabilityLevel, Index, WalOptions};
use tempfile::TempDir;

fn wal_path(dir: &std::path::Path) -> std::path::PathBuf {
    dir.join(".smoldb").join("wal.log")
}

fn recovering_index(dir: &std::path::Path) -> Index {
    let mut index = Index::new(dir);
    index.init_wal(WalOptions::default()).unwrap();
    index
}

#[test]
fn replay_restores_lost_data_files() {
    let tmp = TempDir::new().unwrap();
    {
        let mut index = Index::new(tmp.path());
        index
            .init_wal(WalOptions::with_durability(DurabilityLevel::Commit))
            .unwrap();
        index.put("kept", b"{\"v\": 1}").unwrap();
        index.put("removed", b"{\"v\": 2}").unwrap();
        index.delete("removed").unwrap();
    }

    // Crash: the data files vanish, the log survives.
    fs::remove_file(tmp.path().join("kept.json")).unwrap();

    let index = recovering_index(tmp.path());
    let stats = index.wal_replay().unwrap();

    assert_eq!(stats.puts, 2);
    assert_eq!(stats.deletes, 1);
    let doc = index.lookup("kept").expect("replayed back into the map");
    assert_eq!(doc.read_content(index.dir()).unwrap(), b"{\"v\": 1}");
    assert!(index.lookup("removed").is_none());
}

#[test]
fn replay_heals_a_partially_written_document() {
    let tmp = TempDir::new().unwrap();
    {
        let mut index = Index::new(tmp.path());
        index.init_wal(WalOptions::default()).unwrap();
        index.put("doc", b"{\"full\": \"content\"}").unwrap();
    }

    // Crash mid-content-write: the file exists but is empty.
    fs::write(tmp.path().join("doc.json"), b"").unwrap();

    let index = recovering_index(tmp.path());
    index.wal_replay().unwrap();

    let doc = index.lookup("doc").unwrap();
    assert_eq!(
        doc.read_content(index.dir()).unwrap(),
        b"{\"full\": \"content\"}"
    );
}

#[test]
fn replaying_twice_is_idempotent() {
    let tmp = TempDir::new().unwrap();
    {
        let mut index = Index::new(tmp.path());
        index.init_wal(WalOptions::default()).unwrap();
        index.put("a", b"{\"v\": 1}").unwrap();
        index.put("a", b"{\"v\": 2}").unwrap();
        index.put("b", b"{}").unwrap();
    }

    let index = recovering_index(tmp.path());
    index.wal_replay().unwrap();
    let after_first = index.lookup("a").unwrap().read_content(index.dir()).unwrap();

    index.wal_replay().unwrap();
    let after_second = index.lookup("a").unwrap().read_content(index.dir()).unwrap();

    assert_eq!(after_first, after_second);
    assert_eq!(after_first, b"{\"v\": 2}");
    assert_eq!(index.list_keys().len(), 2);
}

#[test]
fn torn_final_line_is_treated_as_unwritten() {
    let tmp = TempDir::new().unwrap();
    {
        let mut index = Index::new(tmp.path());
        index.init_wal(WalOptions::default()).unwrap();
        index.put("before", b"{\"v\": 1}").unwrap();
    }

    // Crash mid-append: half a JSON object at the tail.
    let mut log = OpenOptions::new()
        .append(true)
        .open(wal_path(tmp.path()))
        .unwrap();
    log.write_all(b"{\"v\":1,\"op\":\"PUT\",\"key\":\"torn")
        .unwrap();
    drop(log);

    let index = recovering_index(tmp.path());
    let stats = index.wal_replay().unwrap();

    assert!(stats.halted_at_corruption);
    assert_eq!(stats.puts, 1);
    assert!(index.lookup("before").is_some());
    assert!(index.lookup("torn").is_none());
}

#[test]
fn log_prefix_captured_by_a_checkpoint_is_discardable() {
    let tmp = TempDir::new().unwrap();
    {
        let mut index = Index::new(tmp.path());
        index.init_wal(WalOptions::default()).unwrap();
        index.put("a", b"{\"v\": \"a\"}").unwrap();
        index.put("b", b"{\"v\": \"b\"}").unwrap();
        // The checkpoint captures a and b and truncates their log prefix.
        index.create_checkpoint().unwrap();
        index.put("c", b"{\"v\": \"c\"}").unwrap();
    }

    let index = recovering_index(tmp.path());
    index.restore_from_checkpoint().unwrap();
    index.wal_replay().unwrap();

    let mut keys = index.list_keys();
    keys.sort();
    assert_eq!(keys, vec!["a", "b", "c"]);
    let doc = index.lookup("c").unwrap();
    assert_eq!(doc.read_content(index.dir()).unwrap(), b"{\"v\": \"c\"}");
}

/// Restoring a checkpoint records where meaningful log history begins,
/// but replay does not consult it: the whole log is re-scanned from
/// byte 0. Idempotent application makes the full scan safe; this test
/// exists to pin the tracked-but-unused offset so any change to either
/// side is deliberate.
#[test]
fn replay_rescans_full_log_after_restore() {
    let tmp = TempDir::new().unwrap();
    {
        let mut index = Index::new(tmp.path());
        index.init_wal(WalOptions::default()).unwrap();
        index.put("snapshotted", b"{\"v\": 1}").unwrap();
        index.create_checkpoint().unwrap();
        index.put("post_checkpoint", b"{\"v\": 2}").unwrap();
    }

    let index = recovering_index(tmp.path());
    index.restore_from_checkpoint().unwrap();

    // The bookmark was recorded from the snapshot...
    assert!(index.replay_resume_offset() > 0);

    // ...yet replay starts at the top of the (truncated) log and still
    // applies the post-checkpoint entry that lives before that offset.
    let stats = index.wal_replay().unwrap();
    assert_eq!(stats.puts, 1);
    assert!(index.lookup("post_checkpoint").is_some());
}

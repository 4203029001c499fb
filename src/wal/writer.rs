//! WAL append path and durability policy
//!
//! The log lives at `<dir>/.smoldb/wal.log`, opened append-only for the
//! life of the [`Wal`]. Every mutation appends one entry line before the
//! mutation itself is applied.
//!
//! Durability tiers:
//!
//! - `None` — append only, no sync.
//! - `Commit` — a COMMIT marker and a sync after every append.
//! - `Grouped` — sync after every Nth append (`group_batch`), and/or on
//!   a fixed interval (`group_interval`). The two triggers are
//!   independent knobs. The interval trigger runs on a background
//!   flusher thread so the append path never blocks on a timer.
//!
//! Sync modes: `None` writes the COMMIT marker but skips the fsync
//! (data may be lost without notice); `Fsync` and `Dsync` both perform
//! a full fsync — the platform offers no distinct datasync guarantee
//! worth exposing.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::warn;

use super::entry::{WalEntry, WalOp};
use crate::error::{Result, StoreError};

/// Directory holding the log, relative to the database directory.
pub const WAL_DIR: &str = ".smoldb";
/// Log filename inside [`WAL_DIR`].
pub const WAL_FILE: &str = "wal.log";

/// When WAL appends are followed by a sync point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DurabilityLevel {
    /// No sync beyond the OS page cache
    #[default]
    None,
    /// Sync after every append
    Commit,
    /// Sync after every Nth append and/or on a fixed interval
    Grouped,
}

/// How a sync point reaches stable storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncMode {
    /// Write the COMMIT marker but skip the fsync
    None,
    /// Full fsync
    #[default]
    Fsync,
    /// Alias for a full fsync
    Dsync,
}

/// WAL configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalOptions {
    pub durability: DurabilityLevel,
    pub sync_mode: SyncMode,
    /// Interval trigger for `Grouped`; `None` disables it
    pub group_interval: Option<Duration>,
    /// Batch trigger for `Grouped`; `0` disables it
    pub group_batch: usize,
}

impl Default for WalOptions {
    fn default() -> Self {
        Self {
            durability: DurabilityLevel::None,
            sync_mode: SyncMode::Fsync,
            group_interval: None,
            group_batch: 0,
        }
    }
}

impl WalOptions {
    /// Options with the given durability and default sync behavior.
    pub fn with_durability(durability: DurabilityLevel) -> Self {
        Self {
            durability,
            ..Self::default()
        }
    }
}

struct WalInner {
    file: File,
    /// Total appends since open, drives the batch trigger
    append_count: u64,
    /// Appends since the last sync point, keeps the flusher quiet when idle
    appends_since_sync: u64,
}

impl WalInner {
    /// Writes a COMMIT marker and applies the sync mode.
    fn commit_and_sync(&mut self, mode: SyncMode) -> Result<()> {
        let marker = WalEntry::stamped(WalOp::Commit, "", None);
        let mut line = serde_json::to_string(&marker)
            .map_err(|e| StoreError::Corrupt(format!("failed to encode COMMIT marker: {}", e)))?;
        line.push('\n');
        self.file.write_all(line.as_bytes())?;
        self.appends_since_sync = 0;

        match mode {
            SyncMode::None => Ok(()),
            SyncMode::Fsync | SyncMode::Dsync => {
                self.file.sync_all()?;
                Ok(())
            }
        }
    }
}

struct Flusher {
    /// Stop flag plus wakeup for a prompt shutdown
    stop: Arc<(Mutex<bool>, Condvar)>,
    thread: JoinHandle<()>,
}

/// Append-only write-ahead log handle.
///
/// Shared across request threads; the file handle sits behind a mutex
/// so lines never interleave.
pub struct Wal {
    path: PathBuf,
    options: WalOptions,
    inner: Arc<Mutex<WalInner>>,
    /// Where meaningful history begins after a checkpoint restore
    resume_offset: AtomicU64,
    flusher: Option<Flusher>,
}

impl Wal {
    /// Opens (or creates) the log under `dir` and spawns the interval
    /// flusher when the grouped time trigger is configured.
    pub fn open(dir: &Path, options: WalOptions) -> Result<Self> {
        let wal_dir = dir.join(WAL_DIR);
        fs::create_dir_all(&wal_dir)?;
        let path = wal_dir.join(WAL_FILE);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        let inner = Arc::new(Mutex::new(WalInner {
            file,
            append_count: 0,
            appends_since_sync: 0,
        }));

        let flusher = match (options.durability, options.group_interval) {
            (DurabilityLevel::Grouped, Some(interval)) if !interval.is_zero() => Some(
                spawn_flusher(Arc::clone(&inner), options.sync_mode, interval),
            ),
            _ => None,
        };

        Ok(Self {
            path,
            options,
            inner,
            resume_offset: AtomicU64::new(0),
            flusher,
        })
    }

    /// Path of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one entry line and applies the durability policy.
    ///
    /// The entry is stamped with version, timestamp and checksum here;
    /// callers supply only the operation fields.
    pub fn append(&self, op: WalOp, key: &str, body: Option<String>) -> Result<()> {
        let entry = WalEntry::stamped(op, key, body);
        let mut line = serde_json::to_string(&entry)
            .map_err(|e| StoreError::Corrupt(format!("failed to encode WAL entry: {}", e)))?;
        line.push('\n');

        let mut inner = self.lock_inner()?;
        inner.file.write_all(line.as_bytes())?;
        inner.append_count += 1;
        inner.appends_since_sync += 1;

        match self.options.durability {
            DurabilityLevel::None => {}
            DurabilityLevel::Commit => inner.commit_and_sync(self.options.sync_mode)?,
            DurabilityLevel::Grouped => {
                let batch = self.options.group_batch as u64;
                if batch > 0 && inner.append_count % batch == 0 {
                    inner.commit_and_sync(self.options.sync_mode)?;
                }
                // The interval trigger fires on the flusher thread.
            }
        }
        Ok(())
    }

    /// Forces a sync point now, regardless of durability level.
    pub fn sync(&self) -> Result<()> {
        self.lock_inner()?.commit_and_sync(self.options.sync_mode)
    }

    /// Current byte length of the log.
    pub fn offset(&self) -> Result<u64> {
        let inner = self.lock_inner()?;
        Ok(inner.file.metadata()?.len())
    }

    /// Discards the log prefix up to `offset`, keeping any entries
    /// appended after it. Used after a successful checkpoint.
    pub fn truncate_at(&self, offset: u64) -> Result<()> {
        let mut inner = self.lock_inner()?;

        let bytes = fs::read(&self.path)?;
        let cut = offset.min(bytes.len() as u64) as usize;
        let tail = &bytes[cut..];

        let mut rewritten = OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&self.path)?;
        rewritten.write_all(tail)?;
        rewritten.sync_all()?;
        drop(rewritten);

        inner.file = OpenOptions::new().append(true).open(&self.path)?;
        Ok(())
    }

    /// Records where meaningful history begins after a checkpoint
    /// restore.
    pub fn set_resume_offset(&self, offset: u64) {
        self.resume_offset.store(offset, Ordering::Relaxed);
    }

    /// The last recorded replay-resume offset (0 when no checkpoint has
    /// been restored).
    pub fn resume_offset(&self) -> u64 {
        self.resume_offset.load(Ordering::Relaxed)
    }

    fn lock_inner(&self) -> Result<std::sync::MutexGuard<'_, WalInner>> {
        self.inner
            .lock()
            .map_err(|_| StoreError::LockPoisoned("wal file"))
    }
}

impl Drop for Wal {
    fn drop(&mut self) {
        if let Some(flusher) = self.flusher.take() {
            let (stop, wakeup) = &*flusher.stop;
            if let Ok(mut stopped) = stop.lock() {
                *stopped = true;
            }
            wakeup.notify_all();
            let _ = flusher.thread.join();
        }
    }
}

impl std::fmt::Debug for Wal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wal")
            .field("path", &self.path)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Background thread driving the grouped time trigger.
///
/// Wakes every `interval`, and syncs only when appends landed since the
/// last sync point. Stops when the owning [`Wal`] is dropped.
fn spawn_flusher(inner: Arc<Mutex<WalInner>>, mode: SyncMode, interval: Duration) -> Flusher {
    let stop = Arc::new((Mutex::new(false), Condvar::new()));
    let thread_stop = Arc::clone(&stop);

    let thread = thread::spawn(move || {
        let (stop, wakeup) = &*thread_stop;
        let mut stopped = match stop.lock() {
            Ok(guard) => guard,
            Err(_) => return,
        };
        while !*stopped {
            let (guard, timeout) = match wakeup.wait_timeout(stopped, interval) {
                Ok(woken) => woken,
                Err(_) => return,
            };
            stopped = guard;
            if *stopped || !timeout.timed_out() {
                continue;
            }
            let mut wal = match inner.lock() {
                Ok(guard) => guard,
                Err(_) => return,
            };
            if wal.appends_since_sync > 0 {
                if let Err(e) = wal.commit_and_sync(mode) {
                    warn!(error = %e, "grouped WAL flush failed");
                }
            }
        }
    });

    Flusher { stop, thread }
}

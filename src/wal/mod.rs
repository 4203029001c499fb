//! Write-ahead log subsystem
//!
//! Mutation intents are appended here before they touch document
//! storage, so a crash between the two leaves the log ahead of the
//! data — never behind it. Replay closes the gap.
//!
//! # Invariants
//!
//! - Every applied mutation has a WAL entry written strictly before the
//!   mutation is considered durable for its configured level.
//! - Entries are totally ordered by file-append order.
//! - Replay halts at the first torn or corrupt line and treats the rest
//!   of the log as unwritten.
//! - Full-content PUT entries make replay idempotent.

mod entry;
mod replay;
mod writer;

pub use entry::{fold_checksum, WalEntry, WalOp, WAL_VERSION};
pub use replay::{replay_log, ReplayStats, ReplayTarget};
pub use writer::{DurabilityLevel, SyncMode, Wal, WalOptions, WAL_DIR, WAL_FILE};

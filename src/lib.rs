//! # smoldb
//!
//! An embedded JSON document store: a directory of individually
//! addressable documents, accessed concurrently, mutated through a
//! write-ahead log for crash safety, periodically snapshotted via
//! checkpoints, and protected by per-document checksums. Documents may
//! embed `REF::` pointers to other documents, expanded on read with a
//! bounded depth budget.
//!
//! ## Architecture Overview
//!
//! ```text
//!                      ┌─────────────────────┐
//!                      │        Index        │
//!                      │  (RwLock'd key map) │
//!                      └──────────┬──────────┘
//!              append first       │        snapshot / restore
//!          ┌──────────────────────┼──────────────────────┐
//!          ▼                      ▼                      ▼
//!   ┌─────────────┐       ┌─────────────┐        ┌─────────────┐
//!   │     WAL     │       │  Documents  │        │ Checkpoints │
//!   │ (JSON lines)│       │ *.json +    │        │   *.snap    │
//!   │             │       │ *.json.meta │        │             │
//!   └─────────────┘       └─────────────┘        └─────────────┘
//! ```
//!
//! On startup: restore the latest checkpoint (if any), then replay the
//! WAL. A crash between WAL append and content write is healed by
//! replay; a torn final WAL line is treated as unwritten.

pub mod checkpoint;
mod clock;
pub mod document;
pub mod error;
pub mod index;
pub mod integrity;
pub mod resolver;
pub mod wal;

pub use checkpoint::CheckpointMeta;
pub use document::Document;
pub use error::{Result, StoreError};
pub use index::Index;
pub use integrity::{calculate_checksum, verify_all, Metadata, VerifyOutcome, VerifyStatus};
pub use resolver::{resolve_references, REF_MARKER};
pub use wal::{DurabilityLevel, ReplayStats, SyncMode, WalOptions};

/// Current crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Sync module for multi-device synchronization
//!
//! Provides:
//! - Owner-scoped record store behind a trait seam
//! - Last-write-wins conflict resolution
//! - Tombstones for logical deletion
//! - Per-device sync cursors
//!
//! # Sync Protocol
//!
//! 1. Device sends its local changes and deletions in one batch
//! 2. Server merges the batch atomically; records owned by someone else are
//!    skipped and reported back
//! 3. Server returns the authoritative state (full, or changes since the
//!    device's previous cursor) and the new cursor
//! 4. On any failure the device retries the whole batch with the same ids
//!
//! # Conflict Resolution
//!
//! - Whatever reaches the server last overwrites the whole record
//! - Client timestamps are never compared
//! - Deletion is a flag, undone only by an explicit `is_deleted: false`

mod conflict;
mod coordinator;
mod cursor;
mod store;
mod tombstone;
mod types;

pub use conflict::{Applied, ConflictResolver, Resolution};
pub use coordinator::SyncCoordinator;
pub use cursor::{CursorTracker, PullScope};
pub use store::{RecordStore, RecordTx, SqliteRecordStore};
pub use tombstone::TombstoneManager;
pub use types::{
    validate_device_id, EntityKind, PullQuery, PullResult, PushBatch, SkipReason, SkippedRecord,
    SyncRequest, SyncResponse, SyncStatus,
};

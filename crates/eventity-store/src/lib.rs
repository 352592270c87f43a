// ABOUTME: Persistence layer for eventity, behind the StorageProvider contract.
// ABOUTME: Provides the in-memory reference backend, a JSONL file backend, and snapshots.

pub mod jsonl;
pub mod memory;
mod paths;
pub mod provider;
pub mod snapshot;

pub use jsonl::JsonlStorageProvider;
pub use memory::MemoryStorageProvider;
pub use provider::{StorageError, StorageProvider};
pub use snapshot::{FsSnapshotStore, SnapshotError, SnapshotRecord, SnapshotStore};

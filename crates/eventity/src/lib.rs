// ABOUTME: Public surface of the eventity event-sourcing store.
// ABOUTME: Re-exports the store, options, errors, and the core and provider types callers need.

pub mod error;
pub mod options;
mod staging;
pub mod store;

pub use error::{CommitReport, CommittedStream, FailedStream, StoreError, StreamRef};
pub use options::{StoreOptions, TagMatch};
pub use store::EventityStore;

pub use eventity_core::{
    Entity, EntityEvent, EventEnvelope, ProjectionError, Projector, TransitionTable,
};
pub use eventity_store::{
    FsSnapshotStore, JsonlStorageProvider, MemoryStorageProvider, SnapshotError, SnapshotRecord,
    SnapshotStore, StorageError, StorageProvider,
};

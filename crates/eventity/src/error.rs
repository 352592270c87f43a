// ABOUTME: Store-level error taxonomy and the commit report returned by save_changes.
// ABOUTME: PartialCommit carries the committed/failed split for multi-stream batches.

use std::fmt;

use eventity_core::ProjectionError;
use eventity_store::{SnapshotError, StorageError};
use thiserror::Error;
use ulid::Ulid;

/// Identifies one entity stream: the entity-type namespace plus the id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct StreamRef {
    pub entity_type: String,
    pub entity_id: String,
}

impl fmt::Display for StreamRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.entity_type, self.entity_id)
    }
}

/// A stream whose append failed during `save_changes`. Its staged events
/// remain in the buffer, so retrying `save_changes` retries exactly the
/// failed subset.
#[derive(Debug)]
pub struct FailedStream {
    pub stream: StreamRef,
    pub error: StorageError,
}

/// Errors surfaced by the store. Nothing is retried internally; the caller
/// decides whether to retry, skip, or abort.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("projection error: {0}")]
    Projection(#[from] ProjectionError),

    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("payload codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error(
        "partial commit: {} stream(s) committed, {} failed",
        .committed.len(),
        .failed.len()
    )]
    PartialCommit {
        committed: Vec<StreamRef>,
        failed: Vec<FailedStream>,
    },
}

/// One stream's share of a successful commit: the contiguous sequence range
/// appended.
#[derive(Debug, Clone)]
pub struct CommittedStream {
    pub stream: StreamRef,
    pub first_sequence: u64,
    pub last_sequence: u64,
}

/// The outcome of a fully successful `save_changes` call.
#[derive(Debug, Clone)]
pub struct CommitReport {
    pub commit_id: Ulid,
    pub streams: Vec<CommittedStream>,
}

impl CommitReport {
    /// Total number of events appended across all streams in this commit.
    pub fn appended(&self) -> usize {
        self.streams
            .iter()
            .map(|stream| (stream.last_sequence - stream.first_sequence + 1) as usize)
            .sum()
    }
}

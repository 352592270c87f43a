// ABOUTME: The StorageProvider contract for durable event append, replay, and tag lookup.
// ABOUTME: Any backend honoring the sequence check and tag atomicity is interchangeable.

use std::collections::BTreeSet;

use eventity_core::EventEnvelope;
use thiserror::Error;

/// Errors surfaced by storage providers. The store performs no hidden
/// retries; every failure carries enough stream context for the caller to
/// decide whether to retry, skip, or abort.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error(
        "concurrency conflict on {entity_type}/{entity_id}: assumed last sequence {assumed}, stream is at {actual}"
    )]
    ConcurrencyConflict {
        entity_type: String,
        entity_id: String,
        assumed: u64,
        actual: u64,
    },

    #[error("invalid append for {entity_type}/{entity_id}: {reason}")]
    InvalidAppend {
        entity_type: String,
        entity_id: String,
        reason: String,
    },
}

impl StorageError {
    /// True when the failure is a stale sequence assumption, recoverable by
    /// re-staging against fresh state and retrying.
    pub fn is_concurrency_conflict(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. })
    }
}

/// Capability set the store core depends on, independent of medium. A
/// conforming flat-file, relational, or key-value backend is pluggable
/// without changes to the core.
pub trait StorageProvider: Send + Sync {
    /// Idempotent provisioning of the durable medium. Safe to call any
    /// number of times; must never destroy existing data.
    fn initialize(&self) -> Result<(), StorageError>;

    /// Last persisted sequence number for a stream; 0 if the stream is
    /// absent.
    fn last_sequence(&self, entity_type: &str, entity_id: &str) -> Result<u64, StorageError>;

    /// Durably append an ordered batch to one stream, all-or-nothing.
    ///
    /// The batch must start exactly one past the stored last sequence; a
    /// stale start fails with `ConcurrencyConflict` and writes nothing.
    /// Tag-index entries are derived from the sequence-1 envelope's tags in
    /// the same append.
    fn append(
        &self,
        entity_type: &str,
        entity_id: &str,
        envelopes: &[EventEnvelope],
    ) -> Result<(), StorageError>;

    /// The full ordered stream for an entity id; empty if absent.
    fn read(&self, entity_type: &str, entity_id: &str) -> Result<Vec<EventEnvelope>, StorageError>;

    /// Entity ids whose stream was tagged at creation with `tag`, within one
    /// entity-type namespace only.
    fn entity_ids_by_tag(
        &self,
        entity_type: &str,
        tag: &str,
    ) -> Result<BTreeSet<String>, StorageError>;
}

/// Shared contract check for append batches: non-empty, addressed to the
/// given stream, contiguous, 1-based, and starting exactly one past `last`.
pub(crate) fn check_append(
    entity_type: &str,
    entity_id: &str,
    last: u64,
    envelopes: &[EventEnvelope],
) -> Result<(), StorageError> {
    let invalid = |reason: String| StorageError::InvalidAppend {
        entity_type: entity_type.to_string(),
        entity_id: entity_id.to_string(),
        reason,
    };

    let Some(first) = envelopes.first() else {
        return Err(invalid("empty batch".to_string()));
    };

    for envelope in envelopes {
        if envelope.entity_type != entity_type || envelope.entity_id != entity_id {
            return Err(invalid(format!(
                "envelope addressed to {}/{}",
                envelope.entity_type, envelope.entity_id
            )));
        }
    }

    if first.sequence == 0 {
        return Err(invalid("sequence numbers are 1-based".to_string()));
    }

    if first.sequence != last + 1 {
        return Err(StorageError::ConcurrencyConflict {
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            assumed: first.sequence - 1,
            actual: last,
        });
    }

    for pair in envelopes.windows(2) {
        if pair[1].sequence != pair[0].sequence + 1 {
            return Err(invalid(format!(
                "non-contiguous sequence {} after {}",
                pair[1].sequence, pair[0].sequence
            )));
        }
    }

    Ok(())
}

// ABOUTME: In-memory staging buffer holding uncommitted events per entity stream.
// ABOUTME: Scoped to one store instance; drained by commit, re-filled for failed streams.

use std::collections::BTreeMap;

use crate::error::StreamRef;

/// One uncommitted event: payload already encoded, awaiting a sequence
/// number at commit time.
#[derive(Debug, Clone)]
pub(crate) struct StagedEvent {
    pub event_type: &'static str,
    pub payload: serde_json::Value,
    pub tags: Vec<String>,
}

/// Uncommitted events grouped per stream. Keys iterate in sorted order, so
/// commits are deterministic; staging order is preserved within each
/// stream. Not thread-safe by design: the store's `&mut self` staging paths
/// enforce a single writer per unit of work.
#[derive(Debug, Default)]
pub(crate) struct StagingBuffer {
    streams: BTreeMap<StreamRef, Vec<StagedEvent>>,
}

impl StagingBuffer {
    pub fn stage(&mut self, stream: StreamRef, event: StagedEvent) {
        self.streams.entry(stream).or_default().push(event);
    }

    /// Drain the whole buffer for a commit attempt.
    pub fn take(&mut self) -> BTreeMap<StreamRef, Vec<StagedEvent>> {
        std::mem::take(&mut self.streams)
    }

    /// Return a failed stream's events to the buffer, order intact, so a
    /// later `save_changes` retries them.
    pub fn put_back(&mut self, stream: StreamRef, events: Vec<StagedEvent>) {
        self.streams.insert(stream, events);
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    pub fn event_count(&self) -> usize {
        self.streams.values().map(Vec::len).sum()
    }

    pub fn clear(&mut self) {
        self.streams.clear();
    }
}

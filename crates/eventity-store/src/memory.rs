// ABOUTME: In-memory reference implementation of the StorageProvider contract.
// ABOUTME: One mutex over streams and tag index gives per-append atomicity.

use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use eventity_core::EventEnvelope;

use crate::provider::{StorageError, StorageProvider, check_append};

#[derive(Default)]
struct MemoryInner {
    streams: HashMap<(String, String), Vec<EventEnvelope>>,
    // tag -> entity_type -> entity ids
    tags: HashMap<String, HashMap<String, BTreeSet<String>>>,
}

/// The reference backend: streams and tag index held in memory behind one
/// lock, so a batch append and its tag-index update land atomically. Reads
/// hand out fresh clones; callers never see shared mutable state.
#[derive(Default)]
pub struct MemoryStorageProvider {
    inner: Mutex<MemoryInner>,
}

impl MemoryStorageProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn locked(&self) -> Result<std::sync::MutexGuard<'_, MemoryInner>, StorageError> {
        self.inner
            .lock()
            .map_err(|_| StorageError::Unavailable("provider lock poisoned".to_string()))
    }
}

impl StorageProvider for MemoryStorageProvider {
    fn initialize(&self) -> Result<(), StorageError> {
        // Nothing to provision; repeated calls must leave stored data alone.
        self.locked().map(|_| ())
    }

    fn last_sequence(&self, entity_type: &str, entity_id: &str) -> Result<u64, StorageError> {
        let inner = self.locked()?;
        let key = (entity_type.to_string(), entity_id.to_string());
        Ok(inner
            .streams
            .get(&key)
            .and_then(|stream| stream.last())
            .map(|envelope| envelope.sequence)
            .unwrap_or(0))
    }

    fn append(
        &self,
        entity_type: &str,
        entity_id: &str,
        envelopes: &[EventEnvelope],
    ) -> Result<(), StorageError> {
        let mut inner = self.locked()?;
        let key = (entity_type.to_string(), entity_id.to_string());

        let last = inner
            .streams
            .get(&key)
            .and_then(|stream| stream.last())
            .map(|envelope| envelope.sequence)
            .unwrap_or(0);
        check_append(entity_type, entity_id, last, envelopes)?;

        if let Some(first) = envelopes.first()
            && first.sequence == 1
        {
            for tag in &first.tags {
                inner
                    .tags
                    .entry(tag.clone())
                    .or_default()
                    .entry(entity_type.to_string())
                    .or_default()
                    .insert(entity_id.to_string());
            }
        }

        inner
            .streams
            .entry(key)
            .or_default()
            .extend(envelopes.iter().cloned());
        Ok(())
    }

    fn read(&self, entity_type: &str, entity_id: &str) -> Result<Vec<EventEnvelope>, StorageError> {
        let inner = self.locked()?;
        let key = (entity_type.to_string(), entity_id.to_string());
        Ok(inner.streams.get(&key).cloned().unwrap_or_default())
    }

    fn entity_ids_by_tag(
        &self,
        entity_type: &str,
        tag: &str,
    ) -> Result<BTreeSet<String>, StorageError> {
        let inner = self.locked()?;
        Ok(inner
            .tags
            .get(tag)
            .and_then(|by_type| by_type.get(entity_type))
            .cloned()
            .unwrap_or_default())
    }
}

// ABOUTME: The EventityStore orchestrator: staging, sequenced commit, replay, tag queries.
// ABOUTME: Optimistic per-stream concurrency; reads see only durably committed events.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use eventity_core::{Entity, EntityEvent, EventEnvelope, Projector};
use eventity_store::{SnapshotRecord, SnapshotStore, StorageError, StorageProvider};
use serde::Serialize;
use serde::de::DeserializeOwned;
use ulid::Ulid;

use crate::error::{CommitReport, CommittedStream, FailedStream, StoreError, StreamRef};
use crate::options::{StoreOptions, TagMatch};
use crate::staging::{StagedEvent, StagingBuffer};

/// An event-sourced store over a pluggable storage provider.
///
/// One instance owns one staging buffer, i.e. one unit of work; any number
/// of instances may share a provider and coordinate purely through
/// optimistic sequence checks at commit time. Reads are read-committed:
/// staged events are never visible to `get_entity`, `get_events`, or
/// `get_by_tags`.
pub struct EventityStore {
    provider: Arc<dyn StorageProvider>,
    options: StoreOptions,
    staging: StagingBuffer,
}

impl EventityStore {
    pub fn new(provider: Arc<dyn StorageProvider>) -> Self {
        Self::with_options(provider, StoreOptions::default())
    }

    pub fn with_options(provider: Arc<dyn StorageProvider>, options: StoreOptions) -> Self {
        Self {
            provider,
            options,
            staging: StagingBuffer::default(),
        }
    }

    /// Ensure the durable medium exists. Idempotent; repeated calls never
    /// touch committed data.
    pub fn initialize(&self) -> Result<(), StoreError> {
        self.provider.initialize()?;
        Ok(())
    }

    /// Stage `event` for `entity_id`. No I/O happens until `save_changes`.
    pub fn stage_event<E: EntityEvent>(
        &mut self,
        entity_id: &str,
        event: E,
    ) -> Result<(), StoreError> {
        self.stage_event_tagged(entity_id, event, &[])
    }

    /// Stage `event` with creation tags. Tags only take effect when the
    /// stream's first committed event comes from this buffer; tags staged
    /// against an existing stream are ignored at commit.
    pub fn stage_event_tagged<E: EntityEvent>(
        &mut self,
        entity_id: &str,
        event: E,
        tags: &[&str],
    ) -> Result<(), StoreError> {
        let entity_id = valid_entity_id(entity_id)?;

        let mut owned_tags = Vec::with_capacity(tags.len());
        for tag in tags {
            if tag.trim().is_empty() {
                return Err(StoreError::InvalidArgument(
                    "tags must be non-empty".to_string(),
                ));
            }
            owned_tags.push((*tag).to_string());
        }

        let payload = serde_json::to_value(&event)?;
        self.staging.stage(
            StreamRef {
                entity_type: E::Entity::ENTITY_TYPE.to_string(),
                entity_id: entity_id.to_string(),
            },
            StagedEvent {
                event_type: E::EVENT_TYPE,
                payload,
                tags: owned_tags,
            },
        );
        Ok(())
    }

    /// Number of staged, uncommitted events.
    pub fn staged_count(&self) -> usize {
        self.staging.event_count()
    }

    /// Drop every staged event without committing anything.
    pub fn discard_changes(&mut self) {
        let dropped = self.staging.event_count();
        self.staging.clear();
        if dropped > 0 {
            tracing::debug!("discarded {} staged event(s)", dropped);
        }
    }

    /// Commit the staging buffer as one logical operation.
    ///
    /// Streams commit independently, in sorted key order. Per stream: the
    /// last persisted sequence is read, the staged events get the next
    /// contiguous numbers, and the batch is appended all-or-nothing with
    /// the provider re-checking the sequence. A failed stream's events stay
    /// staged for retry. A single-stream failure with nothing committed
    /// surfaces the storage error itself; any mixed outcome surfaces
    /// `StoreError::PartialCommit` with both sides of the split.
    pub fn save_changes(&mut self) -> Result<CommitReport, StoreError> {
        if self.staging.is_empty() {
            tracing::debug!("save_changes with empty staging buffer");
            return Ok(CommitReport {
                commit_id: Ulid::new(),
                streams: Vec::new(),
            });
        }

        let commit_id = Ulid::new();
        let recorded_at = Utc::now();
        let mut committed = Vec::new();
        let mut failed = Vec::new();

        for (stream, staged) in self.staging.take() {
            match self.commit_stream(&stream, &staged, commit_id, recorded_at) {
                Ok((first_sequence, last_sequence)) => {
                    tracing::debug!(
                        "committed {} at {}..={}",
                        stream,
                        first_sequence,
                        last_sequence
                    );
                    committed.push(CommittedStream {
                        stream,
                        first_sequence,
                        last_sequence,
                    });
                }
                Err(error) => {
                    tracing::warn!("append failed for {}: {}", stream, error);
                    // Keep the events staged so the caller can retry just
                    // this stream with another save_changes.
                    self.staging.put_back(stream.clone(), staged);
                    failed.push(FailedStream { stream, error });
                }
            }
        }

        if failed.is_empty() {
            let report = CommitReport {
                commit_id,
                streams: committed,
            };
            tracing::info!(
                "commit {}: {} event(s) across {} stream(s)",
                commit_id,
                report.appended(),
                report.streams.len()
            );
            return Ok(report);
        }

        if committed.is_empty() && failed.len() == 1 {
            let failure = failed.remove(0);
            return Err(StoreError::Storage(failure.error));
        }

        Err(StoreError::PartialCommit {
            committed: committed.into_iter().map(|entry| entry.stream).collect(),
            failed,
        })
    }

    fn commit_stream(
        &self,
        stream: &StreamRef,
        staged: &[StagedEvent],
        commit_id: Ulid,
        recorded_at: DateTime<Utc>,
    ) -> Result<(u64, u64), StorageError> {
        let last = self
            .provider
            .last_sequence(&stream.entity_type, &stream.entity_id)?;

        let creation_tags = if last == 0 {
            union_tags(staged)
        } else {
            if staged.iter().any(|event| !event.tags.is_empty()) {
                tracing::debug!("ignoring tags staged against existing stream {}", stream);
            }
            Vec::new()
        };

        let envelopes: Vec<EventEnvelope> = staged
            .iter()
            .enumerate()
            .map(|(offset, event)| EventEnvelope {
                entity_type: stream.entity_type.clone(),
                entity_id: stream.entity_id.clone(),
                sequence: last + 1 + offset as u64,
                event_type: event.event_type.to_string(),
                payload: event.payload.clone(),
                tags: if offset == 0 {
                    creation_tags.clone()
                } else {
                    Vec::new()
                },
                recorded_at,
                commit_id,
            })
            .collect();

        self.provider
            .append(&stream.entity_type, &stream.entity_id, &envelopes)?;
        Ok((last + 1, last + staged.len() as u64))
    }

    /// Load and project current state for `entity_id`. Returns `None` for a
    /// stream with zero committed events; never a default-constructed
    /// entity. Every call returns a fresh, independently owned value.
    pub fn get_entity<T>(&self, entity_id: &str) -> Result<Option<T>, StoreError>
    where
        T: Entity + DeserializeOwned,
    {
        let entity_id = valid_entity_id(entity_id)?;

        let envelopes = self.provider.read(T::ENTITY_TYPE, entity_id)?;
        let Some(stream_last) = envelopes.last().map(|envelope| envelope.sequence) else {
            return Ok(None);
        };

        let projector = Projector::<T>::new();
        let seed = self.load_snapshot_seed::<T>(entity_id, stream_last)?;
        Ok(projector.project_from(seed, &envelopes)?)
    }

    fn load_snapshot_seed<T>(
        &self,
        entity_id: &str,
        stream_last: u64,
    ) -> Result<Option<(T, u64)>, StoreError>
    where
        T: Entity + DeserializeOwned,
    {
        let Some(snapshots) = &self.options.snapshot_store else {
            return Ok(None);
        };
        let Some(record) = snapshots.load_latest(T::ENTITY_TYPE, entity_id)? else {
            return Ok(None);
        };
        if record.last_sequence > stream_last {
            // The snapshot claims events the log does not have; trust the
            // log and replay from scratch.
            tracing::warn!(
                "snapshot for {}/{} is ahead of the log ({} > {}), ignoring",
                T::ENTITY_TYPE,
                entity_id,
                record.last_sequence,
                stream_last
            );
            return Ok(None);
        }

        let state: T = serde_json::from_value(record.state)?;
        Ok(Some((state, record.last_sequence)))
    }

    /// Project current state and persist it through the configured snapshot
    /// store. Returns the sequence the snapshot covers, or `None` when the
    /// stream is absent or no snapshot store is configured.
    pub fn write_snapshot<T>(&self, entity_id: &str) -> Result<Option<u64>, StoreError>
    where
        T: Entity + Serialize + DeserializeOwned,
    {
        let Some(snapshots) = &self.options.snapshot_store else {
            return Ok(None);
        };
        let entity_id = valid_entity_id(entity_id)?;

        let envelopes = self.provider.read(T::ENTITY_TYPE, entity_id)?;
        let Some(last_sequence) = envelopes.last().map(|envelope| envelope.sequence) else {
            return Ok(None);
        };

        let projector = Projector::<T>::new();
        let Some(state) = projector.project(&envelopes)? else {
            return Ok(None);
        };

        snapshots.save(&SnapshotRecord {
            entity_type: T::ENTITY_TYPE.to_string(),
            entity_id: entity_id.to_string(),
            last_sequence,
            state: serde_json::to_value(&state)?,
            saved_at: Utc::now(),
        })?;
        tracing::info!(
            "snapshot written for {}/{} at sequence {}",
            T::ENTITY_TYPE,
            entity_id,
            last_sequence
        );
        Ok(Some(last_sequence))
    }

    /// The ordered committed envelopes of a stream, for inspection or
    /// audit. Read-only; no side effects.
    pub fn get_events<T: Entity>(&self, entity_id: &str) -> Result<Vec<EventEnvelope>, StoreError> {
        let entity_id = valid_entity_id(entity_id)?;
        Ok(self.provider.read(T::ENTITY_TYPE, entity_id)?)
    }

    /// All entities of type `T` whose stream was tagged at creation with
    /// the given tags, combined per the configured match mode, projected to
    /// current state in entity-id order. Tag-string collisions with other
    /// entity types never leak in.
    pub fn get_by_tags<T>(&self, tags: &[&str]) -> Result<Vec<T>, StoreError>
    where
        T: Entity + DeserializeOwned,
    {
        let mut candidates: Option<BTreeSet<String>> = None;
        for tag in tags {
            if tag.trim().is_empty() {
                return Err(StoreError::InvalidArgument(
                    "tags must be non-empty".to_string(),
                ));
            }
            let ids = self.provider.entity_ids_by_tag(T::ENTITY_TYPE, tag)?;
            candidates = Some(match (candidates, self.options.tag_match) {
                (None, _) => ids,
                (Some(acc), TagMatch::Any) => acc.union(&ids).cloned().collect(),
                (Some(acc), TagMatch::All) => acc.intersection(&ids).cloned().collect(),
            });
        }

        let mut entities = Vec::new();
        for entity_id in candidates.unwrap_or_default() {
            if let Some(entity) = self.get_entity::<T>(&entity_id)? {
                entities.push(entity);
            }
        }
        Ok(entities)
    }
}

/// Union of the tags staged for a new stream, preserving first-seen order.
fn union_tags(staged: &[StagedEvent]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut tags = Vec::new();
    for event in staged {
        for tag in &event.tags {
            if seen.insert(tag.clone()) {
                tags.push(tag.clone());
            }
        }
    }
    tags
}

fn valid_entity_id(entity_id: &str) -> Result<&str, StoreError> {
    if entity_id.trim().is_empty() {
        return Err(StoreError::InvalidArgument(
            "entity id must be non-empty".to_string(),
        ));
    }
    Ok(entity_id)
}

// ABOUTME: Transition dispatch table and stream projector for entity reconstruction.
// ABOUTME: Folds ordered envelopes through registered pure transitions, keyed by event type.

use std::collections::HashMap;

use thiserror::Error;

use crate::entity::{Entity, EntityEvent};
use crate::envelope::EventEnvelope;

/// Errors that can occur while projecting a stream into entity state.
#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("no transition registered for event type {event_type:?} on entity type {entity_type:?}")]
    UnknownEventType {
        entity_type: String,
        event_type: String,
    },

    #[error("payload for event type {event_type:?} did not decode: {source}")]
    Payload {
        event_type: String,
        #[source]
        source: serde_json::Error,
    },
}

type Transition<T> =
    Box<dyn Fn(Option<T>, &serde_json::Value) -> Result<T, ProjectionError> + Send + Sync>;

/// Dispatch table mapping event-type discriminators to transition functions
/// for one entity type. Filled by `Entity::transitions`.
pub struct TransitionTable<T: Entity> {
    transitions: HashMap<&'static str, Transition<T>>,
}

impl<T: Entity> TransitionTable<T> {
    fn new() -> Self {
        Self {
            transitions: HashMap::new(),
        }
    }

    /// Register the transition for event type `E`. The stored entry decodes
    /// the stored payload into `E` and delegates to its pure `apply`.
    pub fn on<E: EntityEvent<Entity = T>>(&mut self) {
        self.transitions.insert(
            E::EVENT_TYPE,
            Box::new(|previous, payload| {
                let event: E =
                    serde_json::from_value(payload.clone()).map_err(|source| {
                        ProjectionError::Payload {
                            event_type: E::EVENT_TYPE.to_string(),
                            source,
                        }
                    })?;
                Ok(event.apply(previous))
            }),
        );
    }
}

/// Rebuilds entity state by replaying envelopes through the transition table.
pub struct Projector<T: Entity> {
    table: TransitionTable<T>,
}

impl<T: Entity> Projector<T> {
    pub fn new() -> Self {
        let mut table = TransitionTable::new();
        T::transitions(&mut table);
        Self { table }
    }

    /// Full replay: fold every envelope, in order, starting from absent
    /// state. Returns `None` for an empty stream.
    pub fn project(&self, envelopes: &[EventEnvelope]) -> Result<Option<T>, ProjectionError> {
        self.project_from(None, envelopes)
    }

    /// Replay resuming from a snapshot of the state as of some sequence;
    /// only envelopes past that sequence are applied. Seeding with `None`
    /// is a full replay. Projection seeded from a correct snapshot must
    /// equal full replay of the same stream.
    pub fn project_from(
        &self,
        seed: Option<(T, u64)>,
        envelopes: &[EventEnvelope],
    ) -> Result<Option<T>, ProjectionError> {
        let (mut state, from_sequence) = match seed {
            Some((state, sequence)) => (Some(state), sequence),
            None => (None, 0),
        };

        for envelope in envelopes {
            if envelope.sequence <= from_sequence {
                continue;
            }
            let transition = self
                .table
                .transitions
                .get(envelope.event_type.as_str())
                .ok_or_else(|| ProjectionError::UnknownEventType {
                    entity_type: T::ENTITY_TYPE.to_string(),
                    event_type: envelope.event_type.clone(),
                })?;
            state = Some(transition(state, &envelope.payload)?);
        }

        Ok(state)
    }
}

impl<T: Entity> Default for Projector<T> {
    fn default() -> Self {
        Self::new()
    }
}

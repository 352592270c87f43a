// ABOUTME: Entity and EntityEvent traits binding typed domain events to their streams.
// ABOUTME: Transitions are pure: previous state in by value, new state out, no shared mutation.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::projector::TransitionTable;

/// A projected entity type: an ephemeral value rebuilt by folding the events
/// of one stream, never persisted as a mutable row.
///
/// Implementations name the entity-type namespace their streams live in and
/// register a transition for every event type those streams may contain.
pub trait Entity: Sized + Send + 'static {
    /// Namespace for this entity's streams. Also partitions the tag index,
    /// so colliding tag strings on other entity types never leak into
    /// queries for this one.
    const ENTITY_TYPE: &'static str;

    /// Register the transition for every event type this entity can fold.
    /// An event type missing from the table fails projection with
    /// `ProjectionError::UnknownEventType`.
    fn transitions(table: &mut TransitionTable<Self>);
}

/// A typed domain event belonging to one entity type.
///
/// `apply` must be deterministic and side-effect-free. The previous state is
/// taken by value and a new state is returned; a transition never mutates
/// state shared with the caller, so replays and concurrent projections can
/// reuse the same committed envelopes safely.
pub trait EntityEvent: Serialize + DeserializeOwned + 'static {
    type Entity: Entity;

    /// Discriminator stored on the envelope and used for transition dispatch.
    const EVENT_TYPE: &'static str;

    /// Fold this event into the previous state. `previous` is `None` only
    /// for the first event of a stream.
    fn apply(self, previous: Option<Self::Entity>) -> Self::Entity;
}

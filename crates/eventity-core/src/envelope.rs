// ABOUTME: Defines the EventEnvelope record persisted for every committed domain event.
// ABOUTME: Envelopes carry stream identity, sequence position, payload, and creation tags.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// A committed event record within a single entity stream.
///
/// Sequence numbers are 1-based, strictly increasing, and gap-free per
/// (entity_type, entity_id) stream. The store assigns them at commit time;
/// callers never pick their own. `recorded_at` and `commit_id` are stamped
/// at commit time and carry no projection semantics: replaying the same
/// payloads in the same order yields the same state regardless of when or
/// in which batch they were committed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub entity_type: String,
    pub entity_id: String,
    pub sequence: u64,
    pub event_type: String,
    pub payload: serde_json::Value,
    /// Creation tags; non-empty only on the sequence-1 envelope of a stream.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    pub recorded_at: DateTime<Utc>,
    pub commit_id: Ulid,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_envelope(sequence: u64, tags: Vec<String>) -> EventEnvelope {
        EventEnvelope {
            entity_type: "todo-list".to_string(),
            entity_id: "list-1".to_string(),
            sequence,
            event_type: "todo-added".to_string(),
            payload: serde_json::json!({"todo": "Milk"}),
            tags,
            recorded_at: Utc::now(),
            commit_id: Ulid::new(),
        }
    }

    #[test]
    fn envelope_serde_round_trip() {
        let envelope = make_envelope(1, vec!["Private".to_string()]);

        let json = serde_json::to_string(&envelope).expect("serialize");
        let deserialized: EventEnvelope = serde_json::from_str(&json).expect("deserialize");

        assert_eq!(deserialized.entity_type, "todo-list");
        assert_eq!(deserialized.entity_id, "list-1");
        assert_eq!(deserialized.sequence, 1);
        assert_eq!(deserialized.event_type, "todo-added");
        assert_eq!(deserialized.payload, envelope.payload);
        assert_eq!(deserialized.tags, vec!["Private".to_string()]);
        assert_eq!(deserialized.commit_id, envelope.commit_id);
    }

    #[test]
    fn empty_tags_are_omitted_from_json() {
        let envelope = make_envelope(2, Vec::new());

        let json = serde_json::to_string(&envelope).expect("serialize");
        assert!(!json.contains("\"tags\""));
    }

    #[test]
    fn missing_tags_deserialize_as_empty() {
        let json = r#"{
            "entity_type": "todo-list",
            "entity_id": "list-1",
            "sequence": 3,
            "event_type": "todo-added",
            "payload": {"todo": "Diapers"},
            "recorded_at": "2026-01-01T00:00:00Z",
            "commit_id": "01ARZ3NDEKTSV4RRFFQ69G5FAV"
        }"#;

        let envelope: EventEnvelope = serde_json::from_str(json).expect("deserialize");
        assert!(envelope.tags.is_empty());
    }
}

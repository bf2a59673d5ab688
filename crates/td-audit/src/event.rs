// event.rs — Audit event data model.
//
// Every desk action that changes something (a space created, a close
// confirmed, a transcript archived) is recorded as an AuditEvent. Events form
// a chain: each event includes a `previous_hash` linking it to the prior one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What kind of action this event records.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// A ticket space was provisioned.
    TicketCreated,
    /// A close was requested and a confirmation window opened.
    CloseRequested,
    /// A close was confirmed.
    CloseConfirmed,
    /// A pending close was cancelled by an actor.
    CloseCancelled,
    /// A pending close timed out.
    CloseExpired,
    /// The transcript was durably stored.
    TranscriptArchived,
    /// Storing the transcript failed.
    ArchiveFailed,
    /// The ticket space was deleted.
    SpaceDeleted,
    /// A ticket was abandoned without archival.
    TicketAbandoned,
    /// A member was granted access to an existing ticket.
    MemberAdded,
    /// An authorization check failed.
    PermissionDenied,
}

/// A single audit event — one line in the JSONL audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique identifier for this event.
    pub event_id: Uuid,

    /// When this event occurred (UTC).
    pub timestamp: DateTime<Utc>,

    /// Who performed the action (platform user id, or "system" for timers).
    pub actor_id: String,

    pub action: AuditAction,

    /// The ticket affected, as "{scope}/{number}".
    pub target: Option<String>,

    /// SHA-256 of whatever the action produced (e.g. the transcript).
    pub output_hash: Option<String>,

    /// Hash of the previous event in the log (for tamper detection).
    /// The first event in the log has this set to None.
    pub previous_hash: Option<String>,

    /// Arbitrary additional data.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl AuditEvent {
    /// Create a new audit event with the current timestamp and a random UUID.
    pub fn new(actor_id: impl Into<String>, action: AuditAction) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            actor_id: actor_id.into(),
            action,
            target: None,
            output_hash: None,
            previous_hash: None,
            metadata: serde_json::Value::Null,
        }
    }

    /// Set the target and return self (builder pattern).
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Set the output hash and return self.
    pub fn with_output_hash(mut self, hash: impl Into<String>) -> Self {
        self.output_hash = Some(hash.into());
        self
    }

    /// Set arbitrary metadata and return self.
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serialization_round_trip() {
        let event = AuditEvent::new("42", AuditAction::TranscriptArchived)
            .with_target("gang/3")
            .with_output_hash("abc123")
            .with_metadata(serde_json::json!({"store": "sqlite"}));

        let json = serde_json::to_string(&event).expect("serialize");
        let restored: AuditEvent = serde_json::from_str(&json).expect("deserialize");

        assert_eq!(event.event_id, restored.event_id);
        assert_eq!(event.actor_id, restored.actor_id);
        assert_eq!(event.action, restored.action);
        assert_eq!(event.target, restored.target);
        assert_eq!(restored.metadata["store"], "sqlite");
    }

    #[test]
    fn action_serializes_as_snake_case() {
        let json = serde_json::to_string(&AuditAction::CloseRequested).unwrap();
        assert_eq!(json, "\"close_requested\"");
    }
}

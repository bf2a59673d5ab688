// trail.rs — Shared handle to the audit log.
//
// The desk records an audit event for every action that changes something.
// An audit write failure is logged but never undoes or blocks the action it
// describes: the action has already happened on the platform.

use std::path::Path;
use std::sync::Mutex;

use td_audit::{AuditAction, AuditEvent, AuditLog};

use crate::error::DeskError;

pub struct AuditTrail {
    log: Option<Mutex<AuditLog>>,
}

impl AuditTrail {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DeskError> {
        let log = AuditLog::open(path)?;
        tracing::info!("audit log at {}", log.path().display());
        Ok(Self {
            log: Some(Mutex::new(log)),
        })
    }

    /// A trail that records nothing.
    pub fn disabled() -> Self {
        Self { log: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.log.is_some()
    }

    /// Append one event.
    pub fn record(&self, mut event: AuditEvent) {
        let Some(log) = &self.log else {
            return;
        };
        let mut log = log.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = log.append(&mut event) {
            tracing::error!(action = ?event.action, "failed to write audit event: {}", e);
        }
    }

    /// Shorthand for the common case: who did what to which ticket.
    pub fn note(&self, actor: impl ToString, action: AuditAction, target: impl Into<String>) {
        self.record(AuditEvent::new(actor.to_string(), action).with_target(target));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn recorded_events_are_chained() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let trail = AuditTrail::open(&path).unwrap();
        trail.note(7u64, AuditAction::TicketCreated, "normal/1");
        trail.note("system", AuditAction::CloseExpired, "normal/1");

        assert_eq!(AuditLog::verify_chain(&path).unwrap(), 2);
        let events = AuditLog::read_all(&path).unwrap();
        assert_eq!(events[1].actor_id, "system");
    }

    #[test]
    fn disabled_trail_is_a_no_op() {
        let trail = AuditTrail::disabled();
        assert!(!trail.is_enabled());
        trail.note(1u64, AuditAction::SpaceDeleted, "gang/2");
    }
}

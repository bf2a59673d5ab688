// registry.rs — TicketRegistry: the set of live tickets.
//
// Tickets are keyed by their conversation space. Lifecycle authorization
// reads the creator from here instead of from a platform-side channel field.
//
// Every mutation goes through `update`, which runs a closure against the
// ticket while the registry lock is held. The closure is synchronous, so the
// lock is never held across an `.await`; whichever caller takes the lock
// first sees the state it acts on, and later callers see the result.
//
// With a snapshot directory configured, each ticket is also written as
// `<dir>/<space_id>.json` (one file per ticket, easy to inspect) so open
// tickets survive a restart.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::error::TicketError;
use crate::ids::SpaceId;
use crate::ticket::Ticket;

/// Live tickets, keyed by conversation space.
pub struct TicketRegistry {
    tickets: Mutex<HashMap<SpaceId, Ticket>>,
    snapshot_dir: Option<PathBuf>,
}

impl TicketRegistry {
    /// An in-memory registry (nothing written to disk).
    pub fn new() -> Self {
        Self {
            tickets: Mutex::new(HashMap::new()),
            snapshot_dir: None,
        }
    }

    /// A registry that snapshots each ticket to `dir` and reloads any
    /// snapshots already there.
    ///
    /// Snapshots of terminal tickets are skipped on load (their space is
    /// gone or going).
    pub fn with_snapshots(dir: impl AsRef<Path>) -> Result<Self, TicketError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|source| TicketError::IoError {
            path: dir.display().to_string(),
            source,
        })?;

        let mut tickets = HashMap::new();
        let entries = fs::read_dir(&dir).map_err(|source| TicketError::IoError {
            path: dir.display().to_string(),
            source,
        })?;
        for entry in entries {
            let entry = entry.map_err(|source| TicketError::IoError {
                path: dir.display().to_string(),
                source,
            })?;
            let path = entry.path();
            if !path.extension().is_some_and(|ext| ext == "json") {
                continue;
            }
            let json = fs::read_to_string(&path).map_err(|source| TicketError::IoError {
                path: path.display().to_string(),
                source,
            })?;
            match serde_json::from_str::<Ticket>(&json) {
                Ok(ticket) if !ticket.state.is_terminal() => {
                    tickets.insert(ticket.space, ticket);
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!("skipping unreadable ticket snapshot {}: {}", path.display(), e);
                }
            }
        }

        tracing::info!(count = tickets.len(), "loaded ticket snapshots from {}", dir.display());
        Ok(Self {
            tickets: Mutex::new(tickets),
            snapshot_dir: Some(dir),
        })
    }

    /// Start tracking a new ticket.
    pub fn insert(&self, ticket: Ticket) -> Result<(), TicketError> {
        let mut tickets = self.lock();
        if tickets.contains_key(&ticket.space) {
            return Err(TicketError::DuplicateSpace(ticket.space));
        }
        self.persist(&ticket)?;
        tickets.insert(ticket.space, ticket);
        Ok(())
    }

    /// A copy of the ticket bound to `space`, if any.
    pub fn get(&self, space: SpaceId) -> Option<Ticket> {
        self.lock().get(&space).cloned()
    }

    /// Apply `f` to the ticket bound to `space` atomically.
    ///
    /// `f` works on a copy; the copy replaces the stored ticket only when
    /// `f` returns `Ok`, so a rejected transition leaves no trace.
    pub fn update<T>(
        &self,
        space: SpaceId,
        f: impl FnOnce(&mut Ticket) -> Result<T, TicketError>,
    ) -> Result<T, TicketError> {
        let mut tickets = self.lock();
        let current = tickets.get(&space).ok_or(TicketError::NotFound(space))?;
        let mut next = current.clone();
        let out = f(&mut next)?;
        self.persist(&next)?;
        tickets.insert(space, next);
        Ok(out)
    }

    /// Stop tracking the ticket bound to `space`.
    pub fn remove(&self, space: SpaceId) -> Option<Ticket> {
        let removed = self.lock().remove(&space);
        if removed.is_some() {
            if let Some(path) = self.snapshot_path(space) {
                if let Err(e) = fs::remove_file(&path) {
                    tracing::warn!("failed to remove ticket snapshot {}: {}", path.display(), e);
                }
            }
        }
        removed
    }

    /// All live tickets, oldest first.
    pub fn list(&self) -> Vec<Ticket> {
        let mut tickets: Vec<Ticket> = self.lock().values().cloned().collect();
        tickets.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        tickets
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SpaceId, Ticket>> {
        // A panic while holding the lock cannot leave a half-applied update
        // (updates swap in a finished copy), so a poisoned map is still sound.
        self.tickets.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn persist(&self, ticket: &Ticket) -> Result<(), TicketError> {
        let Some(path) = self.snapshot_path(ticket.space) else {
            return Ok(());
        };
        let json = serde_json::to_string_pretty(ticket)?;
        fs::write(&path, json).map_err(|source| TicketError::IoError {
            path: path.display().to_string(),
            source,
        })
    }

    fn snapshot_path(&self, space: SpaceId) -> Option<PathBuf> {
        self.snapshot_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.json", space)))
    }
}

impl Default for TicketRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::form::FormFields;
    use crate::ids::UserId;
    use crate::ticket::{TicketKind, TicketState};
    use chrono::Utc;
    use tempfile::tempdir;

    fn make_ticket(number: u64, space: u64) -> Ticket {
        Ticket::new(
            TicketKind::Support,
            number,
            SpaceId(space),
            UserId(10),
            "creator",
            FormFields::new(),
        )
    }

    fn pending(window: u64) -> TicketState {
        TicketState::PendingClose {
            requested_by: UserId(10),
            window,
            expires_at: Utc::now(),
            confirmed_by: None,
        }
    }

    #[test]
    fn insert_and_get() {
        let registry = TicketRegistry::new();
        registry.insert(make_ticket(1, 100)).unwrap();
        let found = registry.get(SpaceId(100)).unwrap();
        assert_eq!(found.name, "support-1");
        assert!(registry.get(SpaceId(101)).is_none());
    }

    #[test]
    fn duplicate_space_is_rejected() {
        let registry = TicketRegistry::new();
        registry.insert(make_ticket(1, 100)).unwrap();
        let result = registry.insert(make_ticket(2, 100));
        assert!(matches!(result, Err(TicketError::DuplicateSpace(_))));
    }

    #[test]
    fn failed_update_leaves_ticket_untouched() {
        let registry = TicketRegistry::new();
        registry.insert(make_ticket(1, 100)).unwrap();

        let result = registry.update(SpaceId(100), |t| {
            t.creator_name = "mutated".into();
            t.transition(TicketState::Closed {
                closed_by: UserId(1),
            })
        });
        assert!(result.is_err());
        let t = registry.get(SpaceId(100)).unwrap();
        assert_eq!(t.creator_name, "creator");
        assert_eq!(t.state, TicketState::Open);
    }

    #[test]
    fn update_unknown_space_is_not_found() {
        let registry = TicketRegistry::new();
        let result = registry.update(SpaceId(5), |_| Ok(()));
        assert!(matches!(result, Err(TicketError::NotFound(SpaceId(5)))));
    }

    #[test]
    fn snapshots_survive_reopen() {
        let dir = tempdir().unwrap();
        {
            let registry = TicketRegistry::with_snapshots(dir.path()).unwrap();
            registry.insert(make_ticket(1, 100)).unwrap();
            registry.insert(make_ticket(2, 200)).unwrap();
            registry
                .update(SpaceId(200), |t| t.transition(pending(1)))
                .unwrap();
        }

        let registry = TicketRegistry::with_snapshots(dir.path()).unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get(SpaceId(200)).unwrap().pending_window(), Some(1));
    }

    #[test]
    fn remove_deletes_snapshot() {
        let dir = tempdir().unwrap();
        let registry = TicketRegistry::with_snapshots(dir.path()).unwrap();
        registry.insert(make_ticket(1, 100)).unwrap();
        assert!(dir.path().join("100.json").exists());

        assert!(registry.remove(SpaceId(100)).is_some());
        assert!(!dir.path().join("100.json").exists());
        assert!(registry.is_empty());
    }

    #[test]
    fn terminal_snapshots_are_not_reloaded() {
        let dir = tempdir().unwrap();
        {
            let registry = TicketRegistry::with_snapshots(dir.path()).unwrap();
            registry.insert(make_ticket(1, 100)).unwrap();
            registry
                .update(SpaceId(100), |t| {
                    t.transition(TicketState::Cancelled {
                        reason: "test".into(),
                    })
                })
                .unwrap();
        }
        let registry = TicketRegistry::with_snapshots(dir.path()).unwrap();
        assert!(registry.is_empty());
    }
}

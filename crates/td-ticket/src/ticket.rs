// ticket.rs — Ticket: one private support conversation from open to archive.
//
// A Ticket ties together:
// - a number from its kind's numbering scope (ticket-7, gang-ticket-3, ...)
// - the private conversation space provisioned for it
// - the creator and their form submission
//
// The state machine enforces a valid lifecycle:
//   Open → PendingClose → Closed
//   PendingClose → Open       (cancelled or confirmation window expired)
//   Open | PendingClose → Cancelled  (abandoned without archival)

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TicketError;
use crate::form::{FormFields, FormSpec};
use crate::ids::{MessageId, SpaceId, UserId};

/// The ticket variants. Each kind has its own numbering scope, channel
/// prefix and creation form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketKind {
    Normal,
    Gang,
    Support,
}

impl TicketKind {
    pub const ALL: [TicketKind; 3] = [TicketKind::Normal, TicketKind::Gang, TicketKind::Support];

    /// Numbering scope key for the sequence allocator and the archive.
    pub fn scope(&self) -> &'static str {
        match self {
            TicketKind::Normal => "normal",
            TicketKind::Gang => "gang",
            TicketKind::Support => "support",
        }
    }

    /// Channel name prefix; the channel is `{prefix}-{number}`.
    pub fn channel_prefix(&self) -> &'static str {
        match self {
            TicketKind::Normal => "ticket",
            TicketKind::Gang => "gang-ticket",
            TicketKind::Support => "support",
        }
    }

    /// Human-readable label used in embeds and log entries.
    pub fn label(&self) -> &'static str {
        match self {
            TicketKind::Normal => "Ticket",
            TicketKind::Gang => "Gang Ticket",
            TicketKind::Support => "Support Ticket",
        }
    }

    pub fn channel_name(&self, number: u64) -> String {
        format!("{}-{}", self.channel_prefix(), number)
    }

    /// Recover kind and number from a ticket channel name.
    ///
    /// Longest prefix first: "gang-ticket-4" must not be read as a normal
    /// ticket.
    pub fn parse_channel_name(name: &str) -> Option<(TicketKind, u64)> {
        let mut kinds = Self::ALL;
        kinds.sort_by_key(|k| std::cmp::Reverse(k.channel_prefix().len()));
        kinds.into_iter().find_map(|kind| {
            let rest = name.strip_prefix(kind.channel_prefix())?.strip_prefix('-')?;
            rest.parse().ok().map(|n| (kind, n))
        })
    }

    /// The creation form, or None for kinds opened with a single click.
    pub fn form_spec(&self) -> Option<FormSpec> {
        match self {
            TicketKind::Normal | TicketKind::Gang => Some(FormSpec::incident_report()),
            TicketKind::Support => None,
        }
    }
}

impl fmt::Display for TicketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.scope())
    }
}

impl std::str::FromStr for TicketKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "normal" | "ticket" => Ok(TicketKind::Normal),
            "gang" => Ok(TicketKind::Gang),
            "support" => Ok(TicketKind::Support),
            _ => Err(format!(
                "Invalid ticket kind: '{}'. Valid kinds: normal, gang, support",
                s
            )),
        }
    }
}

/// The lifecycle state of a Ticket.
///
/// `#[serde(tag = "state")]` serializes as `{"state": "pending_close", ...}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TicketState {
    /// Live and usable.
    Open,

    /// A close was requested; waiting for confirmation until `expires_at`.
    ///
    /// `window` identifies this particular confirmation window so a stale
    /// confirm/cancel control or timer from an earlier window is a no-op.
    /// `confirmed_by` is set once a confirmation has claimed the window.
    PendingClose {
        requested_by: UserId,
        window: u64,
        expires_at: DateTime<Utc>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        confirmed_by: Option<UserId>,
    },

    /// Closure confirmed; the transcript has been through archival.
    Closed { closed_by: UserId },

    /// Abandoned without archival.
    Cancelled { reason: String },
}

impl fmt::Display for TicketState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TicketState::Open => write!(f, "open"),
            TicketState::PendingClose { .. } => write!(f, "pending_close"),
            TicketState::Closed { .. } => write!(f, "closed"),
            TicketState::Cancelled { .. } => write!(f, "cancelled"),
        }
    }
}

impl TicketState {
    /// Check whether transitioning from this state to `next` is valid.
    pub fn can_transition_to(&self, next: &TicketState) -> bool {
        matches!(
            (self, next),
            (TicketState::Open, TicketState::PendingClose { .. })
                | (TicketState::PendingClose { .. }, TicketState::Open)
                | (TicketState::PendingClose { .. }, TicketState::Closed { .. })
                | (TicketState::Open, TicketState::Cancelled { .. })
                | (TicketState::PendingClose { .. }, TicketState::Cancelled { .. })
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TicketState::Closed { .. } | TicketState::Cancelled { .. })
    }
}

/// A ticket — one private conversation from creation to archive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    /// Number within the kind's scope.
    pub number: u64,

    pub kind: TicketKind,

    /// The private conversation space. Created once, never reused.
    pub space: SpaceId,

    /// Deterministic channel name, e.g. "gang-ticket-12".
    pub name: String,

    /// Who opened the ticket. Immutable; authorizes close requests.
    pub creator: UserId,

    /// Creator display name at creation time (for log entries).
    pub creator_name: String,

    pub state: TicketState,

    /// Form submission, in field order. Empty for support tickets.
    #[serde(default)]
    pub form: FormFields,

    /// The message carrying the close control.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_message: Option<MessageId>,

    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,

    /// Who confirmed closure (may differ from the creator).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_by: Option<UserId>,
}

impl Ticket {
    /// Create a new Ticket in the Open state.
    pub fn new(
        kind: TicketKind,
        number: u64,
        space: SpaceId,
        creator: UserId,
        creator_name: impl Into<String>,
        form: FormFields,
    ) -> Self {
        Self {
            number,
            kind,
            space,
            name: kind.channel_name(number),
            creator,
            creator_name: creator_name.into(),
            state: TicketState::Open,
            form,
            control_message: None,
            created_at: Utc::now(),
            closed_at: None,
            closed_by: None,
        }
    }

    /// Transition to a new state. Returns an error if the transition is invalid.
    pub fn transition(&mut self, new_state: TicketState) -> Result<(), TicketError> {
        if !self.state.can_transition_to(&new_state) {
            return Err(TicketError::InvalidTransition {
                ticket: self.name.clone(),
                from: self.state.to_string(),
                to: new_state.to_string(),
            });
        }
        if let TicketState::Closed { closed_by } = &new_state {
            self.closed_by = Some(*closed_by);
            self.closed_at = Some(Utc::now());
        }
        self.state = new_state;
        Ok(())
    }

    /// The current confirmation window, if a close is pending.
    pub fn pending_window(&self) -> Option<u64> {
        match self.state {
            TicketState::PendingClose { window, .. } => Some(window),
            _ => None,
        }
    }

    /// Claim the pending confirmation window for `actor`.
    ///
    /// `window = None` claims whichever window is current. Fails if no close
    /// is pending, the window is stale, or another confirmation got there
    /// first. Once claimed, cancel and expiry for that window are no-ops.
    pub fn claim_window(&mut self, window: Option<u64>, actor: UserId) -> Result<UserId, TicketError> {
        match &mut self.state {
            TicketState::PendingClose {
                window: current,
                confirmed_by,
                requested_by,
                ..
            } => {
                if window.is_some_and(|w| w != *current) {
                    return Err(TicketError::WindowClosed {
                        ticket: self.name.clone(),
                    });
                }
                if confirmed_by.is_some() {
                    return Err(TicketError::AlreadyConfirming {
                        ticket: self.name.clone(),
                    });
                }
                *confirmed_by = Some(actor);
                Ok(*requested_by)
            }
            _ => Err(TicketError::WindowClosed {
                ticket: self.name.clone(),
            }),
        }
    }

    /// Whether `window` is the current, still unclaimed confirmation window.
    pub fn window_is_open(&self, window: Option<u64>) -> bool {
        match &self.state {
            TicketState::PendingClose {
                window: current,
                confirmed_by: None,
                ..
            } => window.map_or(true, |w| w == *current),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn test_ticket() -> Ticket {
        Ticket::new(
            TicketKind::Normal,
            7,
            SpaceId(900),
            UserId(1),
            "creator#0001",
            FormFields::new().with("Title", "Help"),
        )
    }

    fn pending(window: u64) -> TicketState {
        TicketState::PendingClose {
            requested_by: UserId(1),
            window,
            expires_at: Utc::now() + Duration::seconds(30),
            confirmed_by: None,
        }
    }

    #[test]
    fn new_ticket_starts_open_with_deterministic_name() {
        let t = test_ticket();
        assert_eq!(t.state, TicketState::Open);
        assert_eq!(t.name, "ticket-7");
        assert!(t.closed_at.is_none());
    }

    #[test]
    fn channel_names_per_kind() {
        assert_eq!(TicketKind::Normal.channel_name(3), "ticket-3");
        assert_eq!(TicketKind::Gang.channel_name(3), "gang-ticket-3");
        assert_eq!(TicketKind::Support.channel_name(3), "support-3");
    }

    #[test]
    fn parse_channel_name_prefers_longest_prefix() {
        assert_eq!(
            TicketKind::parse_channel_name("gang-ticket-12"),
            Some((TicketKind::Gang, 12))
        );
        assert_eq!(
            TicketKind::parse_channel_name("ticket-5"),
            Some((TicketKind::Normal, 5))
        );
        assert_eq!(
            TicketKind::parse_channel_name("support-1"),
            Some((TicketKind::Support, 1))
        );
        assert_eq!(TicketKind::parse_channel_name("general"), None);
        assert_eq!(TicketKind::parse_channel_name("ticket-x"), None);
    }

    #[test]
    fn full_close_path() {
        let mut t = test_ticket();
        t.transition(pending(1)).unwrap();
        t.transition(TicketState::Closed {
            closed_by: UserId(99),
        })
        .unwrap();
        assert_eq!(t.closed_by, Some(UserId(99)));
        assert!(t.closed_at.is_some());
        assert!(t.state.is_terminal());
    }

    #[test]
    fn pending_close_can_revert_to_open() {
        let mut t = test_ticket();
        t.transition(pending(1)).unwrap();
        t.transition(TicketState::Open).unwrap();
        assert_eq!(t.state, TicketState::Open);
    }

    #[test]
    fn open_cannot_close_without_confirmation_window() {
        let mut t = test_ticket();
        let result = t.transition(TicketState::Closed {
            closed_by: UserId(1),
        });
        assert!(matches!(result, Err(TicketError::InvalidTransition { .. })));
    }

    #[test]
    fn terminal_states_are_final() {
        let mut t = test_ticket();
        t.transition(TicketState::Cancelled {
            reason: "space vanished".into(),
        })
        .unwrap();
        assert!(t.transition(TicketState::Open).is_err());
        assert!(t.transition(pending(1)).is_err());
    }

    #[test]
    fn claim_window_is_exclusive() {
        let mut t = test_ticket();
        t.transition(pending(4)).unwrap();
        assert!(t.window_is_open(Some(4)));

        assert_eq!(t.claim_window(Some(4), UserId(2)).unwrap(), UserId(1));
        assert!(!t.window_is_open(Some(4)));
        assert!(matches!(
            t.claim_window(None, UserId(3)),
            Err(TicketError::AlreadyConfirming { .. })
        ));
    }

    #[test]
    fn stale_window_cannot_be_claimed() {
        let mut t = test_ticket();
        t.transition(pending(5)).unwrap();
        assert!(matches!(
            t.claim_window(Some(4), UserId(1)),
            Err(TicketError::WindowClosed { .. })
        ));
        assert!(!t.window_is_open(Some(4)));
        assert!(t.window_is_open(None));
    }

    #[test]
    fn serialization_round_trip() {
        let mut t = test_ticket();
        t.transition(pending(2)).unwrap();
        let json = serde_json::to_string_pretty(&t).unwrap();
        assert!(json.contains("\"pending_close\""));
        let restored: Ticket = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.name, t.name);
        assert_eq!(restored.state, t.state);
        assert_eq!(restored.form, t.form);
    }

    #[test]
    fn kind_parses_from_str() {
        assert_eq!("Gang".parse::<TicketKind>().unwrap(), TicketKind::Gang);
        assert!("vip".parse::<TicketKind>().is_err());
    }
}

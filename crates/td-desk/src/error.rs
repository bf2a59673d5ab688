// error.rs — Error type for desk operations.
//
// Every DeskError ends up in one of two places: the operator log (full
// detail, via tracing) and the actor's ephemeral reply (via user_message,
// which never leaks configuration or platform internals).

use thiserror::Error;

use td_audit::AuditError;
use td_policy::PolicyError;
use td_store::{AllocationError, ArchivalError};
use td_ticket::{SpaceId, TicketError};

use crate::platform::PlatformError;

#[derive(Debug, Error)]
pub enum DeskError {
    /// A container, channel or store is missing or of the wrong type.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The actor may not do this. No state was changed.
    #[error("permission denied: {reason}")]
    PermissionDenied { reason: String },

    /// The form submission was rejected.
    #[error("invalid form: {0}")]
    InvalidForm(String),

    #[error("allocation failed: {0}")]
    Allocation(#[from] AllocationError),

    #[error("archival failed: {0}")]
    Archival(#[from] ArchivalError),

    /// Strict archival gave up; the ticket was reverted to Open.
    #[error("{ticket} kept open: {source}")]
    KeptOpen { ticket: String, source: ArchivalError },

    /// The transcript is archived and the ticket closed, but its space is
    /// still there. The ticket stays tracked so the close can be retried.
    #[error("{ticket} closed but its space was not deleted: {source}")]
    Teardown { ticket: String, source: PlatformError },

    #[error("platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("ticket error: {0}")]
    Ticket(TicketError),

    /// The space is not a tracked ticket.
    #[error("no ticket is tracked for space {0}")]
    UnknownTicket(SpaceId),

    /// The action token could not be parsed or does not fit the context.
    #[error("unknown action '{0}'")]
    UnknownAction(String),

    #[error("audit log error: {0}")]
    Audit(#[from] AuditError),
}

impl From<PolicyError> for DeskError {
    fn from(e: PolicyError) -> Self {
        match e {
            PolicyError::PermissionDenied { reason } => DeskError::PermissionDenied { reason },
        }
    }
}

impl From<TicketError> for DeskError {
    fn from(e: TicketError) -> Self {
        match e {
            TicketError::InvalidForm(msg) => DeskError::InvalidForm(msg),
            TicketError::NotFound(space) => DeskError::UnknownTicket(space),
            other => DeskError::Ticket(other),
        }
    }
}

impl DeskError {
    /// Failures the actor did not cause and cannot fix. Logged at error
    /// level and answered with a generic message.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            DeskError::Configuration(_)
                | DeskError::Allocation(_)
                | DeskError::Platform(_)
                | DeskError::Audit(_)
                | DeskError::KeptOpen { .. }
                | DeskError::Teardown { .. }
        ) || matches!(
            self,
            DeskError::Archival(
                ArchivalError::Unavailable(_) | ArchivalError::Store(_) | ArchivalError::Serialization(_)
            )
        ) || matches!(
            self,
            DeskError::Ticket(TicketError::IoError { .. } | TicketError::SerializationError(_))
        )
    }

    /// The text shown to the actor.
    pub fn user_message(&self) -> String {
        match self {
            DeskError::Configuration(_) | DeskError::Platform(_) | DeskError::Audit(_) => {
                "Something went wrong. Please try again or contact staff.".to_string()
            }
            DeskError::PermissionDenied { reason } => sentence(reason),
            DeskError::InvalidForm(msg) => format!("Your submission was rejected: {}.", msg),
            DeskError::Allocation(_) => {
                "Couldn't allocate a ticket number right now. Please try again later.".to_string()
            }
            DeskError::Archival(ArchivalError::NotFound { scope, number }) => {
                format!("No transcript found for {}/{}.", scope, number)
            }
            DeskError::Archival(ArchivalError::AlreadyArchived { scope, number }) => {
                format!("A transcript for {}/{} is already archived.", scope, number)
            }
            DeskError::Archival(_) => {
                "The transcript archive is unavailable right now. Please try again later.".to_string()
            }
            DeskError::KeptOpen { .. } => {
                "The transcript could not be archived, so the ticket was kept open. Staff have been alerted."
                    .to_string()
            }
            DeskError::Teardown { ticket, .. } => format!(
                "{} is closed, but its channel could not be deleted. Use the button in the channel to retry.",
                ticket
            ),
            DeskError::Ticket(TicketError::WindowClosed { .. }) => {
                "This confirmation is no longer active.".to_string()
            }
            DeskError::Ticket(TicketError::AlreadyConfirming { .. })
            | DeskError::Ticket(TicketError::InvalidTransition { .. }) => {
                "A close is already in progress for this ticket.".to_string()
            }
            DeskError::Ticket(_) => "Something went wrong. Please try again or contact staff.".to_string(),
            DeskError::UnknownTicket(_) => {
                "This command must be used inside a ticket channel.".to_string()
            }
            DeskError::UnknownAction(_) => "This control is no longer active.".to_string(),
        }
    }
}

/// "you don't have permission" → "You don't have permission."
fn sentence(text: &str) -> String {
    let mut chars = text.chars();
    let mut out: String = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => return String::new(),
    };
    if !out.ends_with('.') {
        out.push('.');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_denial_becomes_a_sentence() {
        let err: DeskError = PolicyError::denied("you don't have permission to close this ticket").into();
        assert_eq!(
            err.user_message(),
            "You don't have permission to close this ticket."
        );
        assert!(!err.is_internal());
    }

    #[test]
    fn configuration_detail_is_not_shown_to_the_actor() {
        let err = DeskError::Configuration("container 1234 is not a category".into());
        assert!(!err.user_message().contains("1234"));
        assert!(err.is_internal());
    }

    #[test]
    fn ticket_form_errors_map_to_invalid_form() {
        let err: DeskError = TicketError::InvalidForm("'Title' is required".into()).into();
        assert!(matches!(err, DeskError::InvalidForm(_)));
        assert_eq!(
            err.user_message(),
            "Your submission was rejected: 'Title' is required."
        );
    }

    #[test]
    fn archive_outage_is_internal_and_does_not_claim_a_kept_ticket() {
        let err = DeskError::Archival(ArchivalError::Unavailable("no archive configured".into()));
        assert!(err.is_internal());
        assert_eq!(
            err.user_message(),
            "The transcript archive is unavailable right now. Please try again later."
        );

        let kept = DeskError::KeptOpen {
            ticket: "ticket-3".into(),
            source: ArchivalError::Unavailable("down".into()),
        };
        assert!(kept.user_message().contains("kept open"));

        let missing = DeskError::Archival(ArchivalError::NotFound {
            scope: "gang".into(),
            number: 4,
        });
        assert!(!missing.is_internal());
    }

    #[test]
    fn missing_ticket_maps_to_unknown_ticket() {
        let err: DeskError = TicketError::NotFound(SpaceId(9)).into();
        assert!(matches!(err, DeskError::UnknownTicket(SpaceId(9))));
    }
}

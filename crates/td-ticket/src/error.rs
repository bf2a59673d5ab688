// error.rs — Error types for the ticket subsystem.

use thiserror::Error;

use crate::ids::SpaceId;

/// Errors that can occur during ticket lifecycle operations.
#[derive(Debug, Error)]
pub enum TicketError {
    /// A snapshot file operation failed.
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: String,
        source: std::io::Error,
    },

    /// Failed to serialize/deserialize a ticket snapshot.
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// No live ticket is bound to the given space.
    #[error("no ticket tracked for space {0}")]
    NotFound(SpaceId),

    /// A ticket is already tracked for the given space.
    #[error("space {0} already has a ticket")]
    DuplicateSpace(SpaceId),

    /// Invalid state transition.
    #[error("invalid transition from {from} to {to} for {ticket}")]
    InvalidTransition {
        ticket: String,
        from: String,
        to: String,
    },

    /// The confirmation window referenced by an action is no longer current.
    #[error("confirmation window for {ticket} is no longer open")]
    WindowClosed { ticket: String },

    /// The confirmation window was already claimed by a confirmation.
    #[error("close of {ticket} is already being confirmed")]
    AlreadyConfirming { ticket: String },

    /// A form submission failed validation.
    #[error("invalid form submission: {0}")]
    InvalidForm(String),
}

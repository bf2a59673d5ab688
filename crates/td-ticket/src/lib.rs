//! # td-ticket
//!
//! Ticket record and lifecycle state machine for TicketDesk.
//!
//! A [`Ticket`] is one tracked unit of support work: a number allocated from
//! its kind's numbering scope, one private conversation space on the chat
//! platform, the creator's form submission, and a lifecycle state.
//!
//! ## Key components
//!
//! - [`Ticket`] — the lifecycle state machine (Open → PendingClose → Closed,
//!   with PendingClose → Open on cancel/timeout and Cancelled for abandoned
//!   tickets)
//! - [`TicketKind`] — Normal, Gang and Support variants: naming, scope, form
//! - [`TicketRegistry`] — the live ticket set keyed by conversation space,
//!   with optional JSON snapshots so tickets survive restarts
//! - [`FormSpec`] / [`FormFields`] — the creation form and its submission

pub mod error;
pub mod form;
pub mod ids;
pub mod registry;
pub mod ticket;

pub use error::TicketError;
pub use form::{FormField, FormFields, FormSpec, InputSpec};
pub use ids::{MessageId, Role, RoleId, SpaceId, UserId};
pub use registry::TicketRegistry;
pub use ticket::{Ticket, TicketKind, TicketState};

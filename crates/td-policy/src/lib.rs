//! # td-policy
//!
//! Access policy for TicketDesk ticket spaces.
//!
//! Implements the "default deny" boundary for each ticket channel: nobody
//! sees a ticket unless the [`AccessPolicy`] grants them in the
//! [`GrantSet`] the space is created with.
//!
//! ## Key invariants
//!
//! - **Default deny**: the base grant denies everyone.
//! - **Always admitted**: the requester, the bot's service identity and the
//!   staff role (when configured) get read + write.
//! - **Gang tickets**: the requester must hold a gang role; the first
//!   matching role (platform order) is shared with every holder. No gang
//!   role → `PermissionDenied` and no grants at all.

pub mod engine;
pub mod error;
pub mod grant;

pub use engine::AccessPolicy;
pub use error::PolicyError;
pub use grant::{Grant, GrantSet, Permission, Principal};

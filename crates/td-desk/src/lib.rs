//! # td-desk
//!
//! The ticket desk: everything between an inbound platform interaction and
//! the durable stores.
//!
//! ## Key components
//!
//! - [`TicketDesk`] — routes interactions by their action token and turns
//!   every outcome, including errors, into a [`Reply`] for the actor.
//! - [`TicketProvisioner`] — number allocation, grants, space creation and
//!   seeding for a new ticket.
//! - [`LifecycleController`] — the close flow: confirmation window with a
//!   timeout, transcript rendering, archival, teardown.
//! - [`Platform`] — the boundary to the chat platform. The desk never talks
//!   to a gateway directly; [`testing::MemoryPlatform`] implements it in
//!   memory.
//! - [`DeskConfig`] — `desk.toml`: containers, roles, timeouts, storage.

pub mod action;
pub mod config;
pub mod desk;
pub mod error;
pub mod lifecycle;
pub mod platform;
pub mod provisioner;
pub mod stores;
pub mod testing;
pub mod trail;

pub use action::ActionToken;
pub use config::{ArchiveBackend, DeskConfig, KindConfig, StorageConfig, StrictArchivalConfig};
pub use desk::{Interaction, InteractionKind, Reply, TicketDesk};
pub use error::DeskError;
pub use lifecycle::{CloseOutcome, CloseWindow, LifecycleController};
pub use platform::{
    Actor, Container, ContainerKind, Control, ControlStyle, FileUpload, OutboundMessage, Platform,
    PlatformError, SpaceRequest,
};
pub use provisioner::TicketProvisioner;
pub use stores::Stores;
pub use trail::AuditTrail;

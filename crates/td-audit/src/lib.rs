//! # td-audit
//!
//! Append-only audit log for TicketDesk.
//!
//! Every ticket creation, close request, confirmation, archival and space
//! deletion is recorded as an [`AuditEvent`] in a JSONL (JSON Lines) file.
//! Each line carries the SHA-256 hash of the line before it, so edits to the
//! history are detectable with [`AuditLog::verify_chain`].
//!
//! ## Quick Example
//!
//! ```rust,no_run
//! use td_audit::{AuditLog, AuditEvent, AuditAction};
//!
//! let mut log = AuditLog::open("/tmp/audit.jsonl").unwrap();
//! let mut event = AuditEvent::new("1101039305390043187", AuditAction::TicketCreated)
//!     .with_target("normal/42");
//! log.append(&mut event).unwrap();
//! ```

pub mod error;
pub mod event;
pub mod hasher;
pub mod log;

pub use error::AuditError;
pub use event::{AuditAction, AuditEvent};
pub use log::AuditLog;

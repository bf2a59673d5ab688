//! # td-store
//!
//! Durable state for TicketDesk: ticket number allocation and the
//! transcript archive.
//!
//! ## Key components
//!
//! - [`SequenceAllocator`] — race-free "next number" per scope.
//!   [`SqliteSequence`] does it in one atomic upsert; [`FileSequence`] is the
//!   no-database fallback (a counter file per scope behind a process lock);
//!   [`DegradedSequence`] is the explicit opt-in that falls back when the
//!   database is unreachable.
//! - [`ArchiveStore`] — insert-only transcript storage keyed by
//!   `(scope, number)`: [`SqliteArchive`], [`FileArchive`], and
//!   [`UnavailableArchive`] for deployments without a store (which reports
//!   every save as failed instead of dropping it).

pub mod archive;
pub mod error;
pub mod sequence;
pub mod sqlite;

pub use archive::{
    ArchiveKey, ArchiveReceipt, ArchiveStore, ArchiveSummary, FileArchive, SqliteArchive,
    TranscriptArtifact, UnavailableArchive,
};
pub use error::{AllocationError, ArchivalError, StoreError};
pub use sequence::{DegradedSequence, FileSequence, SequenceAllocator, SqliteSequence};
pub use sqlite::SqliteDb;

// error.rs — Error types for counters and the transcript archive.

use std::path::PathBuf;

use thiserror::Error;

/// Low-level storage failures shared by both halves of the crate.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The blocking worker running a database call died.
    #[error("storage task failed: {0}")]
    Task(String),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A stored value does not fit the expected range or shape.
    #[error("invalid stored value: {0}")]
    InvalidValue(String),
}

/// The sequence allocator could not hand out a number.
///
/// Callers must not substitute a made-up number; see `DegradedSequence` for
/// the explicit opt-in fallback.
#[derive(Debug, Error)]
pub enum AllocationError {
    /// The counter store is unreachable or the increment failed.
    #[error("counter store unavailable for scope '{scope}': {source}")]
    Unavailable { scope: String, source: StoreError },

    /// A fallback counter file holds something other than an integer.
    #[error("counter file {path} is corrupt (content: {content:?})")]
    Corrupt { path: PathBuf, content: String },

    /// Scope keys become file names and table keys; keep them plain.
    #[error("invalid scope '{0}': use letters, digits, '-' or '_'")]
    InvalidScope(String),
}

/// Errors from the transcript archive.
#[derive(Debug, Error)]
pub enum ArchivalError {
    /// No durable store is configured or reachable.
    #[error("archive unavailable: {0}")]
    Unavailable(String),

    #[error("no transcript archived for {scope}/{number}")]
    NotFound { scope: String, number: u64 },

    /// Artifacts are immutable: a second save for the same key is refused.
    #[error("transcript for {scope}/{number} is already archived")]
    AlreadyArchived { scope: String, number: u64 },

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Scope keys end up in file names; reject anything that could escape a
/// directory or surprise a shell.
pub(crate) fn check_scope(scope: &str) -> Result<(), AllocationError> {
    let ok = !scope.is_empty()
        && scope
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if ok {
        Ok(())
    } else {
        Err(AllocationError::InvalidScope(scope.to_string()))
    }
}

// error.rs — Error types for the policy subsystem.

use thiserror::Error;

/// Errors that can occur during policy evaluation.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// The actor is not allowed to do what they asked.
    #[error("permission denied: {reason}")]
    PermissionDenied { reason: String },
}

impl PolicyError {
    pub fn denied(reason: impl Into<String>) -> Self {
        PolicyError::PermissionDenied {
            reason: reason.into(),
        }
    }
}

// error.rs — Error types for the audit subsystem.
//
// Each variant maps to a specific failure mode in the audit pipeline.
// `ImmutabilityViolation` is deliberately its own variant so callers can
// tell "you tried to rewrite history" apart from ordinary I/O trouble.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

use crate::event::Intent;

/// The kind of mutation that was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    Update,
    Delete,
    /// Appending an event whose id is already stored.
    Overwrite,
}

impl fmt::Display for Mutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mutation::Update => write!(f, "update"),
            Mutation::Delete => write!(f, "delete"),
            Mutation::Overwrite => write!(f, "overwrite"),
        }
    }
}

/// Errors that can occur during audit operations.
#[derive(Debug, Error)]
pub enum AuditError {
    /// Failed to open or create an audit file.
    #[error("failed to open audit file at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to write an event.
    #[error("failed to append event: {0}")]
    WriteFailed(#[from] std::io::Error),

    /// Failed to serialize or deserialize an event.
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// A stored line could not be parsed back into an event.
    #[error("corrupt audit file {path} at line {line}: {message}")]
    Corrupt {
        path: PathBuf,
        line: usize,
        message: String,
    },

    /// Someone tried to change or remove a written event.
    #[error("immutability violation: refusing to {mutation} audit event {event_id}")]
    ImmutabilityViolation { event_id: Uuid, mutation: Mutation },

    /// A state-changing write arrived without `confirmation = true`.
    #[error("{intent} is a state change and requires confirmation=true")]
    ConfirmationRequired { intent: Intent },

    /// Required event fields are missing or malformed.
    #[error("invalid audit event: {0}")]
    InvalidEvent(String),

    #[error("audit event {0} not found")]
    EventNotFound(Uuid),

    #[error("audit lock poisoned: {0}")]
    LockPoisoned(String),

    /// Checkpoint signing or verification failed.
    #[error("attestation failed: {0}")]
    Attestation(String),

    /// The dispatcher worker is gone.
    #[error("audit dispatcher is not running")]
    DispatcherClosed,
}

impl AuditError {
    /// Whether retrying the same write could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AuditError::WriteFailed(_) | AuditError::OpenFailed { .. }
        )
    }

    /// The event is already stored under its id.
    pub fn is_duplicate(&self) -> bool {
        matches!(
            self,
            AuditError::ImmutabilityViolation {
                mutation: Mutation::Overwrite,
                ..
            }
        )
    }
}

//! Domain errors for the duel arena.

use thiserror::Error;
use uuid::Uuid;

use super::models::score::ScoreParseError;

/// Domain-level errors that can occur while planning or running duels.
#[derive(Debug, Error)]
pub enum DomainError {
    /// Invalid setup; halts before any duel runs.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// No built-in competition has this id.
    #[error("Unknown competition template: {0}")]
    UnknownTemplate(String),

    /// Worker id names a provider tag nobody registered.
    #[error("Unknown provider '{provider}' for worker '{worker_id}'")]
    UnknownProvider { provider: String, worker_id: String },

    /// A duel names a worker the experiment does not have.
    #[error("Unknown worker: {0}")]
    UnknownWorker(String),

    /// Only locked items can be marked done or failed.
    #[error("Invalid queue transition for message {message_id}: expected locked, item is {actual}")]
    InvalidQueueTransition { message_id: Uuid, actual: String },

    /// A second experiment row was about to be written.
    #[error("An experiment is already stored in this database")]
    ExperimentAlreadyExists,

    /// The master's evaluation could not be turned into scores.
    #[error("Score parse error: {0}")]
    ScoreParse(#[from] ScoreParseError),

    /// A remote call failed for good (fatal, or retries exhausted).
    #[error("Invocation of '{worker_id}' failed: {reason}")]
    Invocation { worker_id: String, reason: String },

    /// A prompt variable was missing.
    #[error("Template error: {0}")]
    Template(String),

    /// Invariant violated by stored or computed data.
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// SQLite error.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// JSON or timestamp (de)serialization error.
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl DomainError {
    /// Errors that must halt a run instead of being contained at duel level.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_) | Self::UnknownTemplate(_) | Self::UnknownProvider { .. }
        )
    }
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}

//! Domain errors for the control plane.

use thiserror::Error;
use uuid::Uuid;

/// Domain-level errors that can occur in the control plane.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("task not found: {0}")]
    TaskNotFound(Uuid),

    #[error("task already exists: {0}")]
    TaskAlreadyExists(Uuid),

    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("task dependency cycle detected involving task: {0}")]
    DependencyCycle(Uuid),

    #[error("validation failed: {0}")]
    ValidationFailed(String),

    #[error("database error: {0}")]
    DatabaseError(String),

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("concurrency conflict: {entity} {id} was modified")]
    ConcurrencyConflict { entity: String, id: String },

    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    #[error("memory entry not found: {0}")]
    MemoryEntryNotFound(Uuid),
}

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

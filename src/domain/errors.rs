//! Domain errors for the chatcheck run engine.

use thiserror::Error;
use uuid::Uuid;

use crate::domain::models::RunLevel;

/// Domain-level errors that can occur in chatcheck.
///
/// Judging outcomes (extraction failures, unparseable verdicts, incomplete
/// baselines) are not errors at this level: they are recorded as terminal
/// evaluation status. These variants cover infrastructure and caller mistakes.
#[derive(Debug, Error)]
pub enum DomainError {
    /// No bot with this id
    #[error("Bot not found: {0}")]
    BotNotFound(Uuid),

    /// No suite with this id
    #[error("Suite not found: {0}")]
    SuiteNotFound(Uuid),

    /// No test with this id
    #[error("Test not found: {0}")]
    TestNotFound(Uuid),

    /// No baseline with this id
    #[error("Baseline not found: {0}")]
    BaselineNotFound(Uuid),

    /// No evaluation with this id
    #[error("Evaluation not found: {0}")]
    EvaluationNotFound(Uuid),

    /// No run with this id on the level
    #[error("{level} not found: {id}")]
    RunNotFound {
        /// Level that was searched
        level: RunLevel,
        /// Missing run id
        id: Uuid,
    },

    /// A write would move a settled entity or skip the state machine
    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition {
        /// Current status
        from: String,
        /// Requested status
        to: String,
        /// What made the transition invalid
        reason: String,
    },

    /// Caller supplied an invalid entity or argument
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// Storage failure
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// JSON encoding or decoding failure
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// An external collaborator failed
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    /// An external collaborator replied with something unusable
    #[error("Unparseable response: {0}")]
    UnparseableResponse(String),
}

/// Result alias for domain operations.
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_not_found_names_level() {
        let id = Uuid::nil();
        let err = DomainError::RunNotFound { level: RunLevel::TestRun, id };
        assert_eq!(err.to_string(), format!("test run not found: {id}"));
    }

    #[test]
    fn test_serde_error_conversion() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: DomainError = parse_err.into();
        assert!(matches!(err, DomainError::SerializationError(_)));
    }
}

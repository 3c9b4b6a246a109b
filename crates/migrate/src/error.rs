//! Error types for migration orchestration

use strata_store::{MigrationIndex, MigrationState, StoreError};
use thiserror::Error;

/// Result type alias for orchestrator operations
pub type MigrationResult<T> = Result<T, MigrationError>;

/// Result type returned by migration unit bodies
pub type UnitResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Migration orchestration errors
#[derive(Debug, Clone, Error)]
pub enum MigrationError {
    /// Malformed request or unknown command
    #[error("{0}")]
    InvalidCommand(String),

    /// A migration or finalization is in progress
    #[error("{0}")]
    Running(String),

    /// Command not legal in the current state
    #[error("{0}")]
    Precondition(String),

    /// The database is ahead of the catalog
    #[error("Database has a higher migration index ({database}) than the migration target ({target}).")]
    MismatchingIndices {
        database: MigrationIndex,
        target: MigrationIndex,
    },

    /// The migration catalog is inconsistent
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// A migration unit failed
    #[error("Migration {index} failed: {message}")]
    Unit {
        index: MigrationIndex,
        message: String,
    },

    /// A worker is still running in this process
    #[error("A migration worker is still active")]
    WorkerActive,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MigrationError {
    /// Exclusion error for a running aggregate state
    pub fn running(state: MigrationState) -> Self {
        match state {
            MigrationState::FinalizationRunning => MigrationError::Running(
                "Finalization is running, only 'stats' command is allowed.".to_string(),
            ),
            _ => MigrationError::Running(
                "Migration is running, only 'stats' command is allowed.".to_string(),
            ),
        }
    }

    pub fn catalog<T: Into<String>>(message: T) -> Self {
        MigrationError::Catalog(message.into())
    }

    pub fn precondition<T: Into<String>>(message: T) -> Self {
        MigrationError::Precondition(message.into())
    }

    /// Whether the error is an application-level rejection that is reported
    /// as a failure response rather than propagated
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            MigrationError::InvalidCommand(_)
                | MigrationError::Running(_)
                | MigrationError::Precondition(_)
                | MigrationError::MismatchingIndices { .. }
                | MigrationError::WorkerActive
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_running_messages() {
        assert_eq!(
            MigrationError::running(MigrationState::MigrationRunning).to_string(),
            "Migration is running, only 'stats' command is allowed."
        );
        assert_eq!(
            MigrationError::running(MigrationState::FinalizationRunning).to_string(),
            "Finalization is running, only 'stats' command is allowed."
        );
    }

    #[test]
    fn test_mismatch_message() {
        let err = MigrationError::MismatchingIndices {
            database: 103,
            target: 102,
        };
        assert!(err.to_string().contains("higher migration index"));
        assert!(err.is_rejection());
    }

    #[test]
    fn test_store_errors_are_not_rejections() {
        let err: MigrationError = StoreError::Database("boom".to_string()).into();
        assert!(!err.is_rejection());
        assert!(!MigrationError::Internal("x".to_string()).is_rejection());
    }
}

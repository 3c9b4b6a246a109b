//! Error types for the bookkeeping store and database backends

use thiserror::Error;

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Error types for store operations
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Query execution failed
    #[error("Database error: {0}")]
    Database(String),

    /// Connection or pool failure
    #[error("Connection error: {0}")]
    Connection(String),

    /// Transaction lifecycle failure (begin, commit, rollback)
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// A table that was expected to exist is missing
    #[error("Table '{0}' does not exist")]
    MissingTable(String),

    /// No `version` row exists for the given migration index
    #[error("No version row for migration index {0}")]
    MissingVersion(i32),

    /// Identifier failed validation
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// A persisted migration state string could not be parsed
    #[error("Invalid migration state '{0}'")]
    InvalidState(String),

    /// Backend configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl StoreError {
    /// Whether the error reports a missing table
    pub fn is_missing_table(&self) -> bool {
        matches!(self, StoreError::MissingTable(_))
    }
}

/// PostgreSQL `undefined_table`
#[cfg(feature = "postgres")]
const UNDEFINED_TABLE: &str = "42P01";

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some(UNDEFINED_TABLE) => {
                StoreError::MissingTable(db_err.message().to_string())
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StoreError::Connection(err.to_string())
            }
            _ => StoreError::Database(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            StoreError::MissingTable("user_t".to_string()).to_string(),
            "Table 'user_t' does not exist"
        );
        assert_eq!(
            StoreError::MissingVersion(101).to_string(),
            "No version row for migration index 101"
        );
        assert!(StoreError::MissingTable("x".to_string()).is_missing_table());
        assert!(!StoreError::Database("x".to_string()).is_missing_table());
    }
}

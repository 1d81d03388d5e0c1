//! Ledger error types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, LedgerError>;

#[derive(Error, Debug)]
pub enum LedgerError {
    /// Status is not part of the ledger vocabulary
    #[error("Unknown status '{0}'. Expected one of: {expected}", expected = crate::status::Status::vocabulary())]
    UnknownStatus(String),

    /// Identifier already present in a repository
    #[error("{0}")]
    Duplicate(String),

    /// SQL query or connection error
    #[error("Database query failed: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Stored timestamp text could not be read back
    #[error("Invalid stored timestamp '{value}': {source}")]
    InvalidTimestamp {
        value: String,
        source: chrono::ParseError,
    },
}

impl LedgerError {
    pub fn duplicate(resource_type: &str, identifier: &str) -> Self {
        Self::Duplicate(format!("{} '{}' already exists", resource_type, identifier))
    }

    /// Translate unique-constraint violations into [`LedgerError::Duplicate`]
    pub(crate) fn from_insert(err: sqlx::Error, resource_type: &str, identifier: &str) -> Self {
        let unique = err
            .as_database_error()
            .is_some_and(|db_err| db_err.is_unique_violation());
        if unique {
            Self::duplicate(resource_type, identifier)
        } else {
            Self::Database(err)
        }
    }
}

//! Database errors

use thiserror::Error;

/// Database errors
#[derive(Error, Debug)]
pub enum DbError {
    /// SQLx error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Migration error
    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    /// Record not found
    #[error("record not found")]
    NotFound,

    /// Row content failed validation at the store boundary
    #[error("invalid row: {0}")]
    InvalidRow(String),
}

impl From<vidya_types::ParseEnumError> for DbError {
    fn from(err: vidya_types::ParseEnumError) -> Self {
        Self::InvalidRow(err.to_string())
    }
}

/// Result type for repository operations
pub type DbResult<T> = Result<T, DbError>;

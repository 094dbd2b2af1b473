//! Error types for SQLite storage operations.
//!
//! Provides a unified error type covering database access, constraint
//! violations, configuration problems from the core crate, and record
//! lifecycle misuse.

use rusqlite::ErrorCode;
use thiserror::Error;

/// Errors that can occur while storing or loading records.
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLite database operation failure.
    #[error("database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),

    /// A primary key, unique or not-null constraint rejected a write.
    ///
    /// The offending statement has been rolled back.
    #[error("constraint violation on {table}: {message}")]
    ConstraintViolation { table: String, message: String },

    /// Type, table or query configuration error.
    #[error("schema error: {0}")]
    SchemaError(#[from] rowbind_core::SchemaError),

    /// A value does not fit its column.
    #[error("codec error: {0}")]
    CodecError(#[from] rowbind_core::CodecError),

    /// Commit or delete on an instance that was never inserted.
    #[error("{table} instance has not been inserted")]
    NotPersisted { table: String },

    /// Insert on an instance that already has an identity.
    #[error("{table} instance has already been inserted")]
    AlreadyPersisted { table: String },

    /// A query expected to return a row returned none.
    #[error("no {table} row matches the query")]
    NoRows { table: String },

    /// A query expected to return one row returned several.
    #[error("more than one {table} row matches the query")]
    MultipleRows { table: String },

    /// Filesystem failure reading or writing configuration.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Configuration YAML could not be parsed or written.
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),
}

impl StoreError {
    /// Whether this is the uniform constraint-violation error.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, StoreError::ConstraintViolation { .. })
    }

    /// Maps an SQLite failure on `table`, turning constraint failures into
    /// [`StoreError::ConstraintViolation`].
    pub(crate) fn classify(err: rusqlite::Error, table: &str) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(code, message)
                if code.code == ErrorCode::ConstraintViolation =>
            {
                StoreError::ConstraintViolation {
                    table: table.to_string(),
                    message: message.clone().unwrap_or_else(|| code.to_string()),
                }
            }
            _ => StoreError::DatabaseError(err),
        }
    }
}

impl From<rowbind_core::Error> for StoreError {
    fn from(err: rowbind_core::Error) -> Self {
        match err {
            rowbind_core::Error::Schema(e) => StoreError::SchemaError(e),
            rowbind_core::Error::Codec(e) => StoreError::CodecError(e),
        }
    }
}

/// Convenience alias for results with [`StoreError`].
pub type Result<T> = std::result::Result<T, StoreError>;

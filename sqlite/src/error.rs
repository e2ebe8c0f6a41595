//! Error types for the SQLite backend.

use thiserror::Error;

/// Errors raised while opening or configuring a SQLite target.
///
/// Failures during migration runs are reported as
/// [`MigrateError`](sqlshift_core::MigrateError) instead; this type is
/// wrapped inside it as the backend cause.
#[derive(Debug, Error)]
pub enum SqliteError {
    /// SQLite database operation failure.
    #[error("database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),

    /// Ledger table name is not a plain SQL identifier.
    #[error(
        "invalid ledger table name '{0}': use letters, digits and underscores, \
         starting with a letter or underscore"
    )]
    InvalidTableName(String),

    /// A stored `applied_at` value could not be parsed.
    #[error("invalid applied_at '{value}' for migration {name}")]
    InvalidTimestamp { name: String, value: String },
}

/// Convenience alias for results with [`SqliteError`].
pub type Result<T> = std::result::Result<T, SqliteError>;

//! Error types for the SQLite store binding.

use thiserror::Error;

/// Errors that can occur while migrating or querying a SQLite database.
#[derive(Debug, Error)]
pub enum SqliteError {
    /// Connection-level failure (open, pragma, transaction).
    #[error("database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),

    /// Row-model metadata or conversion failure.
    #[error(transparent)]
    Core(#[from] lensorm_core::Error),

    /// A CRUD operation ran before a connection was opened or bound.
    #[error("no database connection is bound")]
    Unbound,

    /// A statement issued for a row model failed in the store.
    #[error("statement for {model} failed: {statement}: {source}")]
    Execution {
        /// Row-model type name that issued the statement.
        model: String,
        /// Failing statement text.
        statement: String,
        /// Store error.
        #[source]
        source: rusqlite::Error,
    },

    /// Migration lifecycle failure (downgrade, bad version pair, DDL error).
    #[error("migration error: {0}")]
    MigrationError(String),
}

/// Convenience alias for results with [`SqliteError`].
pub type Result<T> = std::result::Result<T, SqliteError>;

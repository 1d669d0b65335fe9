//! Store error type shared by both backends.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors surfaced by connection cores and generic engines.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Opening or attaching a database failed; the session is not usable.
    #[error("open failed: {detail}")]
    Open {
        /// Backend detail message.
        detail: String,
    },

    /// A mutation was attempted through a read-only session.
    #[error("store is read-only")]
    ReadOnly,

    /// Text search requested on an entity without text columns.
    #[error("no searchable fields for table {table}")]
    NoSearchableFields {
        /// Entity table name.
        table: String,
    },

    /// A record lacks the delete-key value required for the operation.
    #[error("record in table {table} has no delete key")]
    MissingKey {
        /// Entity table name.
        table: String,
    },

    /// An in-flight query was cancelled from another thread.
    #[error("query interrupted")]
    Interrupted,

    /// A descriptor-declared column is absent from a result row.
    #[error("column {column} missing from result row")]
    MissingColumn {
        /// Column name.
        column: String,
    },

    /// A result column held an unexpected SQL type.
    #[error("column {column} has unexpected type {found}")]
    ColumnType {
        /// Column name.
        column: String,
        /// SQL type actually found.
        found: &'static str,
    },

    /// Embedded backend error.
    #[error("sqlite error: {0}")]
    Sqlite(rusqlite::Error),

    /// Client/server backend error.
    #[error("postgres error: {0}")]
    Postgres(postgres::Error),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(code, _) = &err {
            if code.code == rusqlite::ErrorCode::OperationInterrupted {
                return StoreError::Interrupted;
            }
        }
        StoreError::Sqlite(err)
    }
}

impl From<postgres::Error> for StoreError {
    fn from(err: postgres::Error) -> Self {
        if err.code() == Some(&postgres::error::SqlState::QUERY_CANCELED) {
            return StoreError::Interrupted;
        }
        StoreError::Postgres(err)
    }
}

//! Error types for the store adapter.
//!
//! All errors are propagated via [`DbError`] which wraps the underlying
//! [`sqlx`] and [`fred`] errors with additional context about which
//! operation failed.

use fred::error::ErrorKind;

use crate::store::Table;

/// Errors that can occur in the store adapter.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// The requested row holds no cells.
    #[error("row {row:?} not found in {table}")]
    RowNotFound {
        /// Column family that was read.
        table: Table,
        /// Row key that was missing.
        row: String,
    },

    /// The store could not be reached or refused the request for now.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A `PostgreSQL` operation failed.
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),

    /// A `PostgreSQL` migration failed.
    #[error("PostgreSQL migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A `Dragonfly`/Redis operation failed.
    #[error("Dragonfly error: {0}")]
    Dragonfly(#[from] fred::error::Error),

    /// A serialization or deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Stored bytes could not be decoded.
    #[error("corrupt cell in {table} row {row:?}: {reason}")]
    Corrupt {
        /// Column family that was read.
        table: Table,
        /// Row key holding the bad cell.
        row: String,
        /// What was wrong with it.
        reason: String,
    },

    /// A configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl DbError {
    /// Whether the failure is a transient I/O problem worth retrying.
    ///
    /// Missing rows, corrupt data and configuration mistakes are permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Unavailable(_) => true,
            Self::Postgres(e) => matches!(
                e,
                sqlx::Error::Io(_)
                    | sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
                    | sqlx::Error::WorkerCrashed
            ),
            Self::Dragonfly(e) => matches!(
                e.kind(),
                ErrorKind::IO | ErrorKind::Timeout | ErrorKind::Canceled | ErrorKind::Backpressure
            ),
            Self::RowNotFound { .. }
            | Self::Migration(_)
            | Self::Serialization(_)
            | Self::Corrupt { .. }
            | Self::Config(_) => false,
        }
    }

    /// Whether this is a [`DbError::RowNotFound`].
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::RowNotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_io_failures_are_transient() {
        assert!(DbError::Unavailable("down".to_owned()).is_transient());
        assert!(DbError::Postgres(sqlx::Error::PoolTimedOut).is_transient());
        assert!(!DbError::Config("bad url".to_owned()).is_transient());
        let missing = DbError::RowNotFound {
            table: Table::Tweets,
            row: "x".to_owned(),
        };
        assert!(!missing.is_transient());
        assert!(missing.is_not_found());
    }
}

//! Error types for the timeline engine.
//!
//! Every component returns [`CoreError`]. Store failures are folded in by
//! the [`From<DbError>`] impl: transient I/O becomes
//! [`CoreError::StoreUnavailable`], a missing row becomes
//! [`CoreError::NotFound`], and anything else is carried as
//! [`CoreError::Store`].

use twissandra_db::DbError;
use twissandra_types::{TweetId, TweetIdParseError, Username, UsernameError};

/// Errors surfaced by the engine components and the service facade.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// The requested user, tweet or row does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The caller supplied something malformed or disallowed.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The store stayed unreachable after every retry.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// The tweet was stored but some timeline entries could not be written.
    #[error("tweet {tweet_id} stored but fan-out failed for {} timeline(s)", failed.len())]
    PartialFanoutFailure {
        /// The tweet that was created and is readable by id.
        tweet_id: TweetId,
        /// Owners of the timelines that did not receive the entry.
        failed: Vec<Username>,
    },

    /// Some follow edges were not applied.
    #[error("{} follow edge(s) could not be applied", failed.len())]
    PartialGraphFailure {
        /// Followees whose edge is missing or only half written.
        failed: Vec<Username>,
    },

    /// A non-transient store fault such as corrupt data.
    #[error("store error: {0}")]
    Store(DbError),
}

impl From<DbError> for CoreError {
    fn from(err: DbError) -> Self {
        if err.is_transient() {
            return Self::StoreUnavailable(err.to_string());
        }
        match err {
            DbError::RowNotFound { table, row } => Self::NotFound(format!("{row:?} in {table}")),
            other => Self::Store(other),
        }
    }
}

impl From<UsernameError> for CoreError {
    fn from(err: UsernameError) -> Self {
        Self::InvalidInput(err.to_string())
    }
}

impl From<TweetIdParseError> for CoreError {
    fn from(err: TweetIdParseError) -> Self {
        Self::InvalidInput(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use twissandra_db::Table;

    use super::*;

    #[test]
    fn transient_store_errors_become_unavailable() {
        let err = CoreError::from(DbError::Unavailable("connection reset".to_owned()));
        assert!(matches!(err, CoreError::StoreUnavailable(_)));
    }

    #[test]
    fn missing_row_becomes_not_found() {
        let err = CoreError::from(DbError::RowNotFound {
            table: Table::Users,
            row: "quagmire".to_owned(),
        });
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[test]
    fn corrupt_cell_stays_a_store_error() {
        let err = CoreError::from(DbError::Corrupt {
            table: Table::Tweets,
            row: "x".to_owned(),
            reason: "bad json".to_owned(),
        });
        assert!(matches!(err, CoreError::Store(_)));
    }

    #[test]
    fn bad_username_is_invalid_input() {
        let err = CoreError::from(UsernameError::Empty);
        assert!(matches!(err, CoreError::InvalidInput(_)));
    }

    #[test]
    fn bad_tweet_id_is_invalid_input() {
        let err = CoreError::from(TweetIdParseError {
            input: "12345".to_owned(),
        });
        assert!(matches!(err, CoreError::InvalidInput(_)));
    }
}

//! Immutable tweet records.
//!
//! Each tweet is one row in [`Table::Tweets`] keyed by the canonical string
//! of its [`TweetId`], with the JSON-encoded [`Tweet`] in a `tweet` column.
//! Records are written once and never updated.

use std::collections::BTreeMap;
use std::sync::Arc;

use twissandra_db::{ColumnKey, DbError, Row, Store, Table};
use twissandra_types::{Tweet, TweetId, TweetIdGenerator, Username};

use crate::error::CoreError;
use crate::retry::RetryPolicy;

/// Column holding the serialized record.
const TWEET_COLUMN: &str = "tweet";

/// Longest accepted tweet body, in characters.
pub const MAX_BODY_CHARS: usize = 140;

/// Creates and reads tweet records.
///
/// Ids come from [`TweetIdGenerator::shared`], so every repository in the
/// process issues strictly increasing ids.
pub struct TweetRepository<S> {
    store: Arc<S>,
    ids: &'static TweetIdGenerator,
    retry: RetryPolicy,
}

impl<S> Clone for TweetRepository<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            ids: self.ids,
            retry: self.retry,
        }
    }
}

/// Check that a body is non-blank and short enough, returning it trimmed.
///
/// # Errors
///
/// Returns [`CoreError::InvalidInput`] describing the violation.
pub fn validate_body(body: &str) -> Result<&str, CoreError> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Err(CoreError::InvalidInput("tweet body is empty".to_owned()));
    }
    let chars = trimmed.chars().count();
    if chars > MAX_BODY_CHARS {
        return Err(CoreError::InvalidInput(format!(
            "tweet body is {chars} characters, limit is {MAX_BODY_CHARS}"
        )));
    }
    Ok(trimmed)
}

impl<S: Store> TweetRepository<S> {
    /// Create a repository over the given store.
    pub const fn new(store: Arc<S>, retry: RetryPolicy) -> Self {
        Self {
            store,
            ids: TweetIdGenerator::shared(),
            retry,
        }
    }

    /// Assign an id and persist a new tweet.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidInput`] for a blank or over-long body and
    /// [`CoreError::StoreUnavailable`] if the record cannot be written.
    pub async fn create_tweet(&self, author: &Username, body: &str) -> Result<Tweet, CoreError> {
        let body = validate_body(body)?;
        let id = self.ids.next_id();
        let tweet = Tweet {
            id,
            author: author.clone(),
            body: body.to_owned(),
            created_at: id.timestamp(),
        };

        let value = serde_json::to_vec(&tweet).map_err(DbError::from)?;
        let row = id.to_string();
        let column = ColumnKey::from_name(TWEET_COLUMN);
        self.retry
            .run("store tweet", || {
                self.store.put(Table::Tweets, &row, &column, &value)
            })
            .await?;

        tracing::debug!(tweet_id = %id, author = %author, "Tweet stored");
        Ok(tweet)
    }

    /// Fetch one tweet.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if no tweet has this id.
    pub async fn get_tweet(&self, id: TweetId) -> Result<Tweet, CoreError> {
        let row_key = id.to_string();
        let row = self
            .retry
            .run("get tweet", || self.store.get(Table::Tweets, &row_key))
            .await
            .map_err(|err| match err {
                CoreError::NotFound(_) => CoreError::NotFound(format!("tweet {id}")),
                other => other,
            })?;
        decode(&row_key, &row)
    }

    /// Fetch several tweets in one batched read.
    ///
    /// Ids with no record are left out of the map. Records that fail to
    /// decode are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::StoreUnavailable`] if the batch read fails.
    pub async fn get_tweets_by_ids(
        &self,
        ids: &[TweetId],
    ) -> Result<BTreeMap<TweetId, Tweet>, CoreError> {
        if ids.is_empty() {
            return Ok(BTreeMap::new());
        }
        let keys: Vec<String> = ids.iter().map(ToString::to_string).collect();
        let rows = self
            .retry
            .run("get tweets", || self.store.multi_get(Table::Tweets, &keys))
            .await?;

        let mut tweets = BTreeMap::new();
        for (key, row) in &rows {
            match decode(key, row) {
                Ok(tweet) => {
                    tweets.insert(tweet.id, tweet);
                }
                Err(err) => {
                    tracing::warn!(
                        tweet_id = %key,
                        error = %err,
                        "Skipping unreadable tweet record"
                    );
                }
            }
        }
        Ok(tweets)
    }
}

fn decode(key: &str, row: &Row) -> Result<Tweet, CoreError> {
    let corrupt = |reason: String| DbError::Corrupt {
        table: Table::Tweets,
        row: key.to_owned(),
        reason,
    };
    let bytes = row
        .get(&ColumnKey::from_name(TWEET_COLUMN))
        .ok_or_else(|| corrupt("missing tweet column".to_owned()))?;
    serde_json::from_slice(bytes).map_err(|e| corrupt(e.to_string()).into())
}

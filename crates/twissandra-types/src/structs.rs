//! Core entity structs: users, tweets, feed entries and feed pages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::FeedKind;
use crate::ids::TweetId;
use crate::username::Username;

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A registered user.
///
/// Credentials are handled elsewhere; the feed engine only needs the name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Unique handle.
    pub username: Username,
    /// When the user registered.
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Tweet
// ---------------------------------------------------------------------------

/// An immutable tweet record. The source of truth for tweet content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tweet {
    /// Time-ordered unique id, also the ordering key in every feed.
    pub id: TweetId,
    /// Who posted it.
    pub author: Username,
    /// Text content.
    pub body: String,
    /// Creation time, derived from `id`.
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Feeds
// ---------------------------------------------------------------------------

/// A pointer from a feed row to a tweet.
///
/// Feed entries are a denormalized materialization: losing one only hides a
/// tweet from one feed, it never loses the tweet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedEntry {
    /// Which feed space the entry lives in.
    pub kind: FeedKind,
    /// Row key of the feed (a username, or the public sentinel).
    pub feed_owner: String,
    /// The tweet this entry points at.
    pub tweet_id: TweetId,
    /// Author of the tweet.
    pub posted_by: Username,
}

/// One tweet on a feed page, joined with its author record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedItem {
    /// Tweet id.
    pub id: TweetId,
    /// Author handle.
    pub author: Username,
    /// Text content.
    pub body: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Author record, `None` if it could not be resolved.
    pub user: Option<User>,
}

impl FeedItem {
    /// Join a tweet with its (possibly missing) author record.
    pub fn new(tweet: Tweet, user: Option<User>) -> Self {
        Self {
            id: tweet.id,
            author: tweet.author,
            body: tweet.body,
            created_at: tweet.created_at,
            user,
        }
    }
}

/// One page of a feed, newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedPage {
    /// Items in descending id order.
    pub items: Vec<FeedItem>,
    /// Cursor of the next (older) page; `None` at the end of the feed.
    pub next_cursor: Option<TweetId>,
}

impl FeedPage {
    /// Whether this is the last page of the feed.
    pub const fn is_last(&self) -> bool {
        self.next_cursor.is_none()
    }
}

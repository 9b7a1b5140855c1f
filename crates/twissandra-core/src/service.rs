//! Caller-facing facade.
//!
//! [`Twissandra`] wires every component onto one injected store handle and
//! accepts raw strings, so a front end (the CLI, or a web layer) never has
//! to validate names, ids or cursors itself. Operations on behalf of a user
//! require that user to be registered.

use std::sync::Arc;

use twissandra_db::Store;
use twissandra_types::{FeedKind, FeedPage, Tweet, TweetId, User, Username};

use crate::config::EngineConfig;
use crate::error::CoreError;
use crate::fanout::TimelineEngine;
use crate::feed::{FeedReader, parse_cursor};
use crate::graph::SocialGraph;
use crate::tweets::TweetRepository;
use crate::users::UserRepository;

/// Number of graph entries listed when the caller does not say.
pub const DEFAULT_GRAPH_LIMIT: usize = 5000;

/// The timeline service.
pub struct Twissandra<S> {
    users: UserRepository<S>,
    tweets: TweetRepository<S>,
    graph: SocialGraph<S>,
    engine: TimelineEngine<S>,
    reader: FeedReader<S>,
}

impl<S> Clone for Twissandra<S> {
    fn clone(&self) -> Self {
        Self {
            users: self.users.clone(),
            tweets: self.tweets.clone(),
            graph: self.graph.clone(),
            engine: self.engine.clone(),
            reader: self.reader.clone(),
        }
    }
}

impl<S: Store> Twissandra<S> {
    /// Build the service over a store.
    pub fn new(store: Arc<S>, config: &EngineConfig) -> Self {
        let users = UserRepository::new(Arc::clone(&store), config.retry);
        let tweets = TweetRepository::new(Arc::clone(&store), config.retry);
        let graph = SocialGraph::new(Arc::clone(&store), config.retry);
        let engine = TimelineEngine::new(Arc::clone(&store), tweets.clone(), graph.clone(), config);
        let reader = FeedReader::new(store, tweets.clone(), users.clone(), config);
        Self {
            users,
            tweets,
            graph,
            engine,
            reader,
        }
    }

    /// Register a new user.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidInput`] for a malformed or taken name.
    pub async fn register(&self, username: &str) -> Result<User, CoreError> {
        let username = Username::new(username)?;
        self.users.register(&username).await
    }

    /// Look up a registered user.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if the user is not registered.
    pub async fn user(&self, username: &str) -> Result<User, CoreError> {
        let username = Username::new(username)?;
        self.users.get(&username).await
    }

    async fn registered(&self, username: &str) -> Result<Username, CoreError> {
        let username = Username::new(username)?;
        self.users.get(&username).await?;
        Ok(username)
    }

    /// Post a tweet as `author`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] for an unregistered author, plus
    /// everything [`TimelineEngine::post_tweet`] can return.
    pub async fn post_tweet(&self, author: &str, body: &str) -> Result<Tweet, CoreError> {
        let author = self.registered(author).await?;
        self.engine.post_tweet(&author, body).await
    }

    /// Make `from` follow `to`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if either user is unregistered and
    /// [`CoreError::InvalidInput`] for a self-follow.
    pub async fn follow(&self, from: &str, to: &str) -> Result<(), CoreError> {
        self.follow_many(from, &[to]).await
    }

    /// Make `from` follow several users at once.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if any user is unregistered (nothing
    /// is written), or [`CoreError::PartialGraphFailure`] naming the edges
    /// that could not be written.
    pub async fn follow_many<T: AsRef<str>>(&self, from: &str, to: &[T]) -> Result<(), CoreError> {
        let from = self.registered(from).await?;
        let mut followees = Vec::with_capacity(to.len());
        for name in to {
            followees.push(self.registered(name.as_ref()).await?);
        }
        self.graph.add_friends(&from, &followees).await
    }

    /// Make `from` stop following `to`. Unfollowing a stranger succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidInput`] for a malformed name.
    pub async fn unfollow(&self, from: &str, to: &str) -> Result<(), CoreError> {
        let from = Username::new(from)?;
        let to = Username::new(to)?;
        self.graph.remove_friend(&from, &to).await
    }

    /// Read one page of a feed.
    ///
    /// `owner` is ignored for the public line. `cursor` is the text form of
    /// a previous page's `next_cursor`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidInput`] for a malformed cursor or limit,
    /// or a missing owner, and [`CoreError::NotFound`] if the owner is not
    /// registered.
    pub async fn get_feed(
        &self,
        kind: FeedKind,
        owner: Option<&str>,
        cursor: Option<&str>,
        limit: Option<usize>,
    ) -> Result<FeedPage, CoreError> {
        let cursor = cursor.map(parse_cursor).transpose()?;
        let owner = match (kind, owner) {
            (FeedKind::Public, _) | (_, None) => None,
            (_, Some(name)) => Some(self.registered(name).await?),
        };
        self.reader
            .get_feed(kind, owner.as_ref(), cursor, limit)
            .await
    }

    /// Fetch one tweet by the text form of its id.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidInput`] for a malformed id and
    /// [`CoreError::NotFound`] if no such tweet exists.
    pub async fn tweet(&self, id: &str) -> Result<Tweet, CoreError> {
        let id: TweetId = id.trim().parse()?;
        self.tweets.get_tweet(id).await
    }

    /// Names of users that `username` follows.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidInput`] for a malformed name.
    pub async fn followees(
        &self,
        username: &str,
        limit: usize,
    ) -> Result<Vec<Username>, CoreError> {
        let username = Username::new(username)?;
        let names = self.graph.followees(&username, limit).await?;
        Ok(names.into_iter().collect())
    }

    /// Names of users following `username`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidInput`] for a malformed name.
    pub async fn followers(
        &self,
        username: &str,
        limit: usize,
    ) -> Result<Vec<Username>, CoreError> {
        let username = Username::new(username)?;
        let names = self.graph.followers(&username, limit).await?;
        Ok(names.into_iter().collect())
    }

    /// Records of users that `username` follows.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidInput`] for a malformed name.
    pub async fn friends(&self, username: &str, limit: usize) -> Result<Vec<User>, CoreError> {
        let username = Username::new(username)?;
        self.graph.friends(&username, limit).await
    }

    /// Records of users following `username`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidInput`] for a malformed name.
    pub async fn follower_users(
        &self,
        username: &str,
        limit: usize,
    ) -> Result<Vec<User>, CoreError> {
        let username = Username::new(username)?;
        self.graph.follower_users(&username, limit).await
    }
}

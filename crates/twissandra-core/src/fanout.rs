//! Fan-out on write.
//!
//! Posting a tweet materializes it into every feed that should show it:
//!
//! ```text
//! post_tweet(author, body)
//!     |
//!     +-- tweets row            (the record itself, written first)
//!     +-- userline[author]      (required)
//!     +-- userline[!PUBLIC!]    (required)
//!     +-- follower snapshot of author
//!         +-- timeline[author], timeline[f] for each follower f
//!             (concurrent, at most `fanout_width` in flight)
//! ```
//!
//! Every feed entry is keyed by the tweet id, so replaying a write lands in
//! the same column and duplicates are impossible. Nothing is rolled back: a
//! tweet whose fan-out partly failed stays readable by id and in the feeds
//! that did receive it.

use std::sync::Arc;

use futures::StreamExt;
use twissandra_db::{ColumnKey, Store, Table};
use twissandra_types::{FeedEntry, FeedKind, PUBLIC_FEED_KEY, Tweet, Username};

use crate::config::EngineConfig;
use crate::error::CoreError;
use crate::graph::SocialGraph;
use crate::retry::RetryPolicy;
use crate::tweets::TweetRepository;

/// Table that stores feeds of the given kind.
///
/// The public line shares the userline table under a reserved row key.
pub const fn feed_table(kind: FeedKind) -> Table {
    match kind {
        FeedKind::Userline | FeedKind::Public => Table::Userline,
        FeedKind::Timeline => Table::Timeline,
    }
}

/// Writes posted tweets into userlines, the public line and timelines.
pub struct TimelineEngine<S> {
    store: Arc<S>,
    tweets: TweetRepository<S>,
    graph: SocialGraph<S>,
    retry: RetryPolicy,
    fanout_width: usize,
}

impl<S> Clone for TimelineEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            tweets: self.tweets.clone(),
            graph: self.graph.clone(),
            retry: self.retry,
            fanout_width: self.fanout_width,
        }
    }
}

impl<S: Store> TimelineEngine<S> {
    /// Assemble an engine from its collaborators.
    pub const fn new(
        store: Arc<S>,
        tweets: TweetRepository<S>,
        graph: SocialGraph<S>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            store,
            tweets,
            graph,
            retry: config.retry,
            fanout_width: config.fanout_width,
        }
    }

    /// Create a tweet and deliver it to every feed that should show it.
    ///
    /// # Errors
    ///
    /// - [`CoreError::InvalidInput`] if the body is rejected; nothing is
    ///   written.
    /// - [`CoreError::StoreUnavailable`] if the tweet record, the author's
    ///   userline, the public line or the follower snapshot could not be
    ///   written or read. If the record itself was written it stays
    ///   readable by id.
    /// - [`CoreError::PartialFanoutFailure`] if some timeline entries could
    ///   not be written after retries.
    pub async fn post_tweet(&self, author: &Username, body: &str) -> Result<Tweet, CoreError> {
        let tweet = self.tweets.create_tweet(author, body).await?;

        let userline = FeedEntry {
            kind: FeedKind::Userline,
            feed_owner: author.as_str().to_owned(),
            tweet_id: tweet.id,
            posted_by: author.clone(),
        };
        let public = FeedEntry {
            kind: FeedKind::Public,
            feed_owner: PUBLIC_FEED_KEY.to_owned(),
            ..userline.clone()
        };

        let (userline_res, public_res, followers) = tokio::join!(
            self.write_entry(&userline),
            self.write_entry(&public),
            self.graph.follower_snapshot(author),
        );
        userline_res?;
        public_res?;
        let followers = followers?;

        // The author always sees their own tweet on their timeline.
        let recipients: Vec<Username> = std::iter::once(author.clone())
            .chain(followers.into_iter().filter(|f| f != author))
            .collect();
        let audience = recipients.len();

        let results: Vec<(Username, Result<(), CoreError>)> = futures::stream::iter(recipients)
            .map(|owner| {
                let entry = FeedEntry {
                    kind: FeedKind::Timeline,
                    feed_owner: owner.as_str().to_owned(),
                    tweet_id: tweet.id,
                    posted_by: author.clone(),
                };
                async move {
                    let result = self.write_entry(&entry).await;
                    (owner, result)
                }
            })
            .buffer_unordered(self.fanout_width.max(1))
            .collect()
            .await;

        let mut failed = Vec::new();
        for (owner, result) in results {
            if let Err(err) = result {
                tracing::warn!(
                    tweet_id = %tweet.id,
                    timeline = %owner,
                    error = %err,
                    "Timeline delivery failed"
                );
                failed.push(owner);
            }
        }

        tracing::info!(
            tweet_id = %tweet.id,
            author = %author,
            delivered = audience.saturating_sub(failed.len()),
            failed = failed.len(),
            "Tweet fanned out"
        );

        if failed.is_empty() {
            Ok(tweet)
        } else {
            failed.sort();
            Err(CoreError::PartialFanoutFailure {
                tweet_id: tweet.id,
                failed,
            })
        }
    }

    async fn write_entry(&self, entry: &FeedEntry) -> Result<(), CoreError> {
        let table = feed_table(entry.kind);
        let column = ColumnKey::from(entry.tweet_id);
        let value = entry.posted_by.as_str().as_bytes();
        self.retry
            .run("write feed entry", || {
                self.store.put(table, &entry.feed_owner, &column, value)
            })
            .await
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::unreachable,
    clippy::arithmetic_side_effects
)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use twissandra_db::{Cell, DbError, MemoryStore, Row, Scan};

    use super::*;

    fn name(s: &str) -> Username {
        Username::new(s).unwrap()
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        graph: SocialGraph<MemoryStore>,
        engine: TimelineEngine<MemoryStore>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let config = EngineConfig {
            fanout_width: 4,
            retry: RetryPolicy {
                max_attempts: 3,
                initial_backoff: Duration::ZERO,
                max_backoff: Duration::ZERO,
                write_timeout: Duration::from_secs(1),
            },
            ..EngineConfig::default()
        };
        let tweets = TweetRepository::new(Arc::clone(&store), config.retry);
        let graph = SocialGraph::new(Arc::clone(&store), config.retry);
        let engine = TimelineEngine::new(Arc::clone(&store), tweets, graph.clone(), &config);
        Fixture {
            store,
            graph,
            engine,
        }
    }

    /// Memory store that records how many timeline writes overlap.
    #[derive(Default)]
    struct GaugedStore {
        inner: MemoryStore,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl Store for GaugedStore {
        async fn get(&self, table: Table, row: &str) -> Result<Row, DbError> {
            self.inner.get(table, row).await
        }

        async fn scan(&self, table: Table, row: &str, scan: &Scan) -> Result<Vec<Cell>, DbError> {
            self.inner.scan(table, row, scan).await
        }

        async fn put(
            &self,
            table: Table,
            row: &str,
            column: &ColumnKey,
            value: &[u8],
        ) -> Result<(), DbError> {
            if table != Table::Timeline {
                return self.inner.put(table, row, column, value).await;
            }
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            let result = self.inner.put(table, row, column, value).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            result
        }

        async fn delete(&self, table: Table, row: &str, column: &ColumnKey) -> Result<(), DbError> {
            self.inner.delete(table, row, column).await
        }

        async fn multi_get(
            &self,
            table: Table,
            rows: &[String],
        ) -> Result<BTreeMap<String, Row>, DbError> {
            self.inner.multi_get(table, rows).await
        }
    }

    async fn has_entry(store: &MemoryStore, table: Table, row: &str, tweet: &Tweet) -> bool {
        store
            .scan(table, row, &Scan::newest_first(100))
            .await
            .unwrap()
            .iter()
            .any(|c| c.column.to_tweet_id() == Some(tweet.id))
    }

    #[tokio::test]
    async fn tweet_reaches_every_feed() {
        let f = fixture();
        f.graph
            .add_friends(&name("stewie"), &[name("brian")])
            .await
            .unwrap();
        f.graph
            .add_friends(&name("meg"), &[name("brian")])
            .await
            .unwrap();

        let tweet = f.engine.post_tweet(&name("brian"), "Hello").await.unwrap();

        assert!(has_entry(&f.store, Table::Userline, "brian", &tweet).await);
        assert!(has_entry(&f.store, Table::Userline, PUBLIC_FEED_KEY, &tweet).await);
        for reader in ["brian", "stewie", "meg"] {
            let delivered = has_entry(&f.store, Table::Timeline, reader, &tweet).await;
            assert!(delivered, "{reader}");
        }
        // Nowhere else.
        assert!(!has_entry(&f.store, Table::Userline, "stewie", &tweet).await);
        assert_eq!(f.store.row_count(Table::Timeline).await, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn timeline_writes_stay_within_fanout_width() {
        let store = Arc::new(GaugedStore::default());
        let config = EngineConfig {
            fanout_width: 4,
            ..EngineConfig::default()
        };
        let tweets = TweetRepository::new(Arc::clone(&store), config.retry);
        let graph = SocialGraph::new(Arc::clone(&store), config.retry);
        let engine = TimelineEngine::new(Arc::clone(&store), tweets, graph.clone(), &config);
        for n in 0..20 {
            let fan = name(&format!("fan_{n:02}"));
            graph.add_friends(&fan, &[name("quagmire")]).await.unwrap();
        }

        store.inner.set_write_delay(Some(Duration::from_millis(10)));
        engine
            .post_tweet(&name("quagmire"), "Giggity")
            .await
            .unwrap();

        assert_eq!(store.peak.load(Ordering::SeqCst), 4);
        assert_eq!(store.in_flight.load(Ordering::SeqCst), 0);
        assert_eq!(store.inner.row_count(Table::Timeline).await, 21);
    }

    #[tokio::test]
    async fn entry_value_is_the_author() {
        let f = fixture();
        let tweet = f.engine.post_tweet(&name("lois"), "Peter!").await.unwrap();
        let row = f.store.get(Table::Timeline, "lois").await.unwrap();
        assert_eq!(
            row.get(&ColumnKey::from(tweet.id)).map(Vec::as_slice),
            Some(&b"lois"[..])
        );
    }

    #[tokio::test]
    async fn transient_timeline_faults_are_retried() {
        let f = fixture();
        f.graph
            .add_friends(&name("meg"), &[name("chris")])
            .await
            .unwrap();
        f.store.fail_next_writes(Table::Timeline, "meg", 2);

        let tweet = f.engine.post_tweet(&name("chris"), "ok").await.unwrap();
        assert!(has_entry(&f.store, Table::Timeline, "meg", &tweet).await);
    }

    #[tokio::test]
    async fn exhausted_timeline_faults_are_reported() {
        let f = fixture();
        f.graph
            .add_friends(&name("meg"), &[name("chris")])
            .await
            .unwrap();
        f.graph
            .add_friends(&name("stewie"), &[name("chris")])
            .await
            .unwrap();
        f.store.fail_next_writes(Table::Timeline, "meg", u32::MAX);

        let err = f.engine.post_tweet(&name("chris"), "hi").await.unwrap_err();
        let CoreError::PartialFanoutFailure { tweet_id, failed } = err else {
            unreachable!("expected a partial fan-out failure, got {err}");
        };
        assert_eq!(failed, vec![name("meg")]);

        // Delivered where it could be, and still readable by id.
        let tweet = Tweet {
            id: tweet_id,
            author: name("chris"),
            body: "hi".to_owned(),
            created_at: tweet_id.timestamp(),
        };
        assert!(has_entry(&f.store, Table::Timeline, "stewie", &tweet).await);
        assert!(has_entry(&f.store, Table::Userline, "chris", &tweet).await);
        assert_eq!(f.engine.tweets.get_tweet(tweet_id).await.unwrap(), tweet);
    }

    #[tokio::test]
    async fn userline_failure_is_a_hard_error() {
        let f = fixture();
        f.store.fail_next_writes(Table::Userline, "peter", u32::MAX);
        let err = f
            .engine
            .post_tweet(&name("peter"), "hmm")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::StoreUnavailable(_)));
        // The tweet record survives.
        assert_eq!(f.store.row_count(Table::Tweets).await, 1);
    }

    #[tokio::test]
    async fn invalid_body_writes_nothing() {
        let f = fixture();
        let err = f
            .engine
            .post_tweet(&name("peter"), "   ")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput(_)));
        for table in Table::ALL {
            assert_eq!(f.store.row_count(table).await, 0);
        }
    }
}

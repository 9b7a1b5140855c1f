//! Paginated feed reads.
//!
//! A page is read as a reverse scan of `limit + 1` entries starting at the
//! cursor (inclusive) or at the newest entry. The extra, oldest entry is not
//! returned; its id becomes the cursor of the next page. Because the cursor
//! names an entry that is still in the row, pages neither skip nor repeat
//! entries, and tweets posted after the first page was read only ever land
//! in front of it.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use twissandra_db::{ColumnKey, Scan, Store};
use twissandra_types::{FeedItem, FeedKind, FeedPage, PUBLIC_FEED_KEY, TweetId, User, Username};

use crate::config::EngineConfig;
use crate::error::CoreError;
use crate::fanout::feed_table;
use crate::retry::RetryPolicy;
use crate::tweets::TweetRepository;
use crate::users::UserRepository;

/// Parse the text form of a page cursor.
///
/// # Errors
///
/// Returns [`CoreError::InvalidInput`] if `cursor` is not a tweet id.
pub fn parse_cursor(cursor: &str) -> Result<TweetId, CoreError> {
    Ok(cursor.trim().parse::<TweetId>()?)
}

/// Reads pages of userlines, timelines and the public line.
pub struct FeedReader<S> {
    store: Arc<S>,
    tweets: TweetRepository<S>,
    users: UserRepository<S>,
    retry: RetryPolicy,
    default_page_size: usize,
    max_page_size: usize,
}

impl<S> Clone for FeedReader<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            tweets: self.tweets.clone(),
            users: self.users.clone(),
            retry: self.retry,
            default_page_size: self.default_page_size,
            max_page_size: self.max_page_size,
        }
    }
}

impl<S: Store> FeedReader<S> {
    /// Assemble a reader from its collaborators.
    pub const fn new(
        store: Arc<S>,
        tweets: TweetRepository<S>,
        users: UserRepository<S>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            store,
            tweets,
            users,
            retry: config.retry,
            default_page_size: config.default_page_size,
            max_page_size: config.max_page_size,
        }
    }

    /// Read one page of a feed, newest first.
    ///
    /// `owner` is required for userlines and timelines and ignored for the
    /// public line. `limit` defaults to the configured page size.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidInput`] if the owner is missing or the
    /// limit is out of range, and [`CoreError::StoreUnavailable`] if the
    /// feed cannot be read.
    pub async fn get_feed(
        &self,
        kind: FeedKind,
        owner: Option<&Username>,
        cursor: Option<TweetId>,
        limit: Option<usize>,
    ) -> Result<FeedPage, CoreError> {
        let row = match (kind, owner) {
            (FeedKind::Public, _) => PUBLIC_FEED_KEY,
            (_, Some(owner)) => owner.as_str(),
            (_, None) => {
                return Err(CoreError::InvalidInput(format!("a {kind} needs an owner")));
            }
        };
        let limit = limit.unwrap_or(self.default_page_size);
        if limit == 0 || limit > self.max_page_size {
            return Err(CoreError::InvalidInput(format!(
                "page size {limit} is outside 1..={}",
                self.max_page_size
            )));
        }

        let want = limit.saturating_add(1);
        let mut ids = self.scan_ids(kind, row, cursor, want).await?;
        let next_cursor = if ids.len() > limit { ids.pop() } else { None };

        let mut tweets = self.tweets.get_tweets_by_ids(&ids).await?;
        let authors: BTreeSet<Username> = tweets.values().map(|t| t.author.clone()).collect();
        let authors: Vec<Username> = authors.into_iter().collect();
        let users: BTreeMap<Username, User> = self
            .users
            .get_many(&authors)
            .await?
            .into_iter()
            .map(|user| (user.username.clone(), user))
            .collect();

        let items: Vec<FeedItem> = ids
            .iter()
            .filter_map(|id| tweets.remove(id))
            .map(|tweet| {
                let user = users.get(&tweet.author).cloned();
                FeedItem::new(tweet, user)
            })
            .collect();

        let dropped = ids.len().saturating_sub(items.len());
        if dropped > 0 {
            tracing::debug!(feed = %kind, row, dropped, "Feed entries without a tweet record");
        }

        Ok(FeedPage { items, next_cursor })
    }

    /// Up to `want` entry ids of a feed row, newest first, from `cursor` on.
    ///
    /// Columns that are not tweet ids are skipped and do not count, so the
    /// row is read further until `want` ids are found or it runs out.
    async fn scan_ids(
        &self,
        kind: FeedKind,
        row: &str,
        cursor: Option<TweetId>,
        want: usize,
    ) -> Result<Vec<TweetId>, CoreError> {
        let table = feed_table(kind);
        let mut ids: Vec<TweetId> = Vec::with_capacity(want);
        let mut resume: Option<ColumnKey> = None;
        loop {
            // A resumed read starts at the last column seen, so ask for one more.
            let missing = want.saturating_sub(ids.len());
            let bound = usize::from(resume.is_some());
            let mut scan = Scan::newest_first(missing.saturating_add(bound));
            if let Some(column) = resume.clone().or_else(|| cursor.map(ColumnKey::from)) {
                scan = scan.starting_at(column);
            }
            let cells = self
                .retry
                .run("scan feed", || self.store.scan(table, row, &scan))
                .await?;

            let fresh = match (&resume, cells.first()) {
                (Some(from), Some(first)) if first.column == *from => {
                    cells.get(1..).unwrap_or_default()
                }
                _ => cells.as_slice(),
            };
            for cell in fresh {
                match cell.column.to_tweet_id() {
                    Some(id) => ids.push(id),
                    None => {
                        tracing::warn!(
                            feed = %kind,
                            row,
                            "Skipping feed entry with a malformed key"
                        );
                    }
                }
            }

            if cells.len() < scan.limit || ids.len() >= want {
                break;
            }
            resume = cells.last().map(|cell| cell.column.clone());
        }
        ids.truncate(want);
        Ok(ids)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use twissandra_db::{MemoryStore, Table};
    use twissandra_types::Tweet;

    use super::*;
    use crate::fanout::TimelineEngine;
    use crate::graph::SocialGraph;

    fn name(s: &str) -> Username {
        Username::new(s).unwrap()
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        engine: TimelineEngine<MemoryStore>,
        reader: FeedReader<MemoryStore>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let config = EngineConfig {
            retry: RetryPolicy::no_retry(Duration::from_secs(1)),
            ..EngineConfig::default()
        };
        let tweets = TweetRepository::new(Arc::clone(&store), config.retry);
        let users = UserRepository::new(Arc::clone(&store), config.retry);
        let graph = SocialGraph::new(Arc::clone(&store), config.retry);
        let engine = TimelineEngine::new(Arc::clone(&store), tweets.clone(), graph, &config);
        let reader = FeedReader::new(Arc::clone(&store), tweets, users, &config);
        Fixture {
            store,
            engine,
            reader,
        }
    }

    async fn post_many(f: &Fixture, author: &str, count: usize) -> Vec<Tweet> {
        let mut posted = Vec::with_capacity(count);
        for n in 0..count {
            let body = format!("tweet number {n}");
            posted.push(f.engine.post_tweet(&name(author), &body).await.unwrap());
        }
        posted
    }

    #[tokio::test]
    async fn empty_feed_is_one_empty_page() {
        let f = fixture();
        let page = f
            .reader
            .get_feed(FeedKind::Timeline, Some(&name("meg")), None, None)
            .await
            .unwrap();
        assert!(page.items.is_empty());
        assert!(page.is_last());
    }

    #[tokio::test]
    async fn exact_fit_has_no_cursor() {
        let f = fixture();
        post_many(&f, "peter", 3).await;
        let page = f
            .reader
            .get_feed(FeedKind::Userline, Some(&name("peter")), None, Some(3))
            .await
            .unwrap();
        assert_eq!(page.items.len(), 3);
        assert!(page.next_cursor.is_none());
    }

    #[tokio::test]
    async fn pages_cover_everything_once_in_descending_order() {
        let f = fixture();
        let posted = post_many(&f, "quagmire", 11).await;

        let mut seen = Vec::new();
        let mut cursor = None;
        loop {
            let page = f
                .reader
                .get_feed(FeedKind::Public, None, cursor, Some(4))
                .await
                .unwrap();
            assert!(page.items.len() <= 4);
            seen.extend(page.items.iter().map(|item| item.id));
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        let mut expected: Vec<TweetId> = posted.iter().map(|t| t.id).collect();
        expected.reverse();
        assert_eq!(seen, expected);
    }

    #[tokio::test]
    async fn new_posts_do_not_shift_later_pages() {
        let f = fixture();
        let posted = post_many(&f, "joe", 6).await;

        let first = f
            .reader
            .get_feed(FeedKind::Userline, Some(&name("joe")), None, Some(3))
            .await
            .unwrap();
        post_many(&f, "joe", 2).await;
        let second = f
            .reader
            .get_feed(
                FeedKind::Userline,
                Some(&name("joe")),
                first.next_cursor,
                Some(3),
            )
            .await
            .unwrap();

        let ids: Vec<TweetId> = second.items.iter().map(|i| i.id).collect();
        let expected: Vec<TweetId> = posted.iter().take(3).rev().map(|t| t.id).collect();
        assert_eq!(ids, expected);
        assert!(second.is_last());
    }

    #[tokio::test]
    async fn dangling_entries_are_dropped() {
        let f = fixture();
        let kept = f
            .engine
            .post_tweet(&name("cleveland"), "kept")
            .await
            .unwrap();
        let ghost = TweetId::from_parts(kept.id.unix_micros().saturating_add(1), 0);
        f.store
            .put(
                Table::Userline,
                "cleveland",
                &ColumnKey::from(ghost),
                b"cleveland",
            )
            .await
            .unwrap();

        let page = f
            .reader
            .get_feed(FeedKind::Userline, Some(&name("cleveland")), None, None)
            .await
            .unwrap();
        let ids: Vec<TweetId> = page.items.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![kept.id]);
        // Unregistered author: no user record joined.
        assert!(page.items.first().unwrap().user.is_none());
    }

    #[tokio::test]
    async fn malformed_key_does_not_end_paging() {
        let f = fixture();
        let posted = post_many(&f, "bruce", 4).await;
        let older = posted.get(1).unwrap().id;
        // Sorts between the second and third tweet and decodes to nothing.
        let mut junk = older.to_bytes().to_vec();
        junk.push(0);
        let junk = ColumnKey::from_bytes(junk);
        f.store
            .put(Table::Userline, "bruce", &junk, b"bruce")
            .await
            .unwrap();

        let bruce = name("bruce");
        let first = f
            .reader
            .get_feed(FeedKind::Userline, Some(&bruce), None, Some(2))
            .await
            .unwrap();
        assert_eq!(first.items.len(), 2);
        assert_eq!(first.next_cursor, Some(older));

        let second = f
            .reader
            .get_feed(FeedKind::Userline, Some(&bruce), first.next_cursor, Some(2))
            .await
            .unwrap();
        let mut seen: Vec<TweetId> = first.items.iter().map(|i| i.id).collect();
        seen.extend(second.items.iter().map(|i| i.id));
        let expected: Vec<TweetId> = posted.iter().rev().map(|t| t.id).collect();
        assert_eq!(seen, expected);
        assert!(second.is_last());
    }

    #[tokio::test]
    async fn limit_and_owner_are_validated() {
        let f = fixture();
        let meg = name("meg");
        for limit in [0, 201] {
            let err = f
                .reader
                .get_feed(FeedKind::Timeline, Some(&meg), None, Some(limit))
                .await
                .unwrap_err();
            assert!(matches!(err, CoreError::InvalidInput(_)), "limit {limit}");
        }
        let err = f
            .reader
            .get_feed(FeedKind::Userline, None, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput(_)));
    }

    #[test]
    fn cursor_parsing() {
        let id = TweetId::from_parts(1_700_000_000_000_000, 42);
        assert_eq!(parse_cursor(&id.to_string()).unwrap(), id);
        assert!(matches!(parse_cursor("yesterday"), Err(CoreError::InvalidInput(_))));
    }
}

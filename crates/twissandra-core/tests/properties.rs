//! Cross-component behaviour of the timeline engine, run against the
//! in-memory store.

#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::panic,
    clippy::missing_panics_doc,
    clippy::indexing_slicing
)]

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use twissandra_core::error::CoreError;
use twissandra_core::retry::RetryPolicy;
use twissandra_core::{EngineConfig, Twissandra};
use twissandra_db::{MemoryStore, Table};
use twissandra_types::{FeedKind, FeedPage, TweetId};

const FAMILY: [&str; 6] = ["peter", "lois", "meg", "chris", "stewie", "brian"];

fn fast_config() -> EngineConfig {
    EngineConfig {
        fanout_width: 3,
        retry: RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
            write_timeout: Duration::from_secs(1),
        },
        ..EngineConfig::default()
    }
}

async fn setup() -> (Arc<MemoryStore>, Twissandra<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let svc = Twissandra::new(Arc::clone(&store), &fast_config());
    for name in FAMILY {
        svc.register(name).await.expect("register");
    }
    (store, svc)
}

fn ids(page: &FeedPage) -> Vec<TweetId> {
    page.items.iter().map(|item| item.id).collect()
}

// =============================================================================
// Social graph
// =============================================================================

#[tokio::test]
async fn graph_indexes_mirror_after_random_edits() {
    let (_, svc) = setup().await;
    let mut rng = StdRng::seed_from_u64(0x7757);

    for _ in 0..200 {
        let from = FAMILY[rng.random_range(0..FAMILY.len())];
        let to = FAMILY[rng.random_range(0..FAMILY.len())];
        if from == to {
            continue;
        }
        if rng.random_bool(0.6) {
            svc.follow(from, to).await.expect("follow");
        } else {
            svc.unfollow(from, to).await.expect("unfollow");
        }
    }

    let mut following = BTreeSet::new();
    let mut followers = BTreeSet::new();
    for name in FAMILY {
        for followee in svc.followees(name, 100).await.unwrap() {
            following.insert((name.to_owned(), followee.into_inner()));
        }
        for follower in svc.followers(name, 100).await.unwrap() {
            followers.insert((follower.into_inner(), name.to_owned()));
        }
    }
    assert_eq!(following, followers);
}

#[tokio::test]
async fn remove_twice_equals_remove_once() {
    let (_, svc) = setup().await;
    svc.follow("meg", "chris").await.unwrap();
    svc.follow("lois", "chris").await.unwrap();

    svc.unfollow("meg", "chris").await.unwrap();
    let once = (
        svc.followees("meg", 100).await.unwrap(),
        svc.followers("chris", 100).await.unwrap(),
    );
    svc.unfollow("meg", "chris").await.unwrap();
    let twice = (
        svc.followees("meg", 100).await.unwrap(),
        svc.followers("chris", 100).await.unwrap(),
    );
    assert_eq!(once, twice);
    assert_eq!(twice.1.len(), 1);
}

// =============================================================================
// Posting and reading
// =============================================================================

#[tokio::test]
async fn stewie_pages_through_his_userline() {
    let (_, svc) = setup().await;
    let t1 = svc.post_tweet("stewie", "hello").await.unwrap();
    let t2 = svc.post_tweet("stewie", "world").await.unwrap();
    assert!(t2.id > t1.id);

    let first = svc
        .get_feed(FeedKind::Userline, Some("stewie"), None, Some(1))
        .await
        .unwrap();
    assert_eq!(ids(&first), vec![t2.id]);
    assert_eq!(first.items[0].body, "world");
    assert_eq!(first.items[0].author.as_str(), "stewie");
    assert_eq!(first.next_cursor, Some(t1.id));

    let cursor = t1.id.to_string();
    let second = svc
        .get_feed(FeedKind::Userline, Some("stewie"), Some(&cursor), Some(1))
        .await
        .unwrap();
    assert_eq!(ids(&second), vec![t1.id]);
    assert_eq!(second.items[0].body, "hello");
    assert!(second.next_cursor.is_none());
}

#[tokio::test]
async fn brian_stops_seeing_stewie_after_unfollowing() {
    let (_, svc) = setup().await;
    svc.follow("brian", "stewie").await.unwrap();
    let before = svc.post_tweet("stewie", "hi").await.unwrap();

    let timeline = svc
        .get_feed(FeedKind::Timeline, Some("brian"), None, None)
        .await
        .unwrap();
    assert!(ids(&timeline).contains(&before.id));

    svc.unfollow("brian", "stewie").await.unwrap();
    let after = svc.post_tweet("stewie", "bye").await.unwrap();

    let timeline = ids(
        &svc.get_feed(FeedKind::Timeline, Some("brian"), None, None)
            .await
            .unwrap(),
    );
    assert!(!timeline.contains(&after.id));
    assert!(timeline.contains(&before.id));
}

#[tokio::test]
async fn new_tweet_heads_every_recipient_feed() {
    let (_, svc) = setup().await;
    svc.follow_many("peter", &["lois"]).await.unwrap();
    svc.follow("meg", "lois").await.unwrap();
    svc.post_tweet("peter", "older").await.unwrap();

    let tweet = svc.post_tweet("lois", "Peter!").await.unwrap();

    let head = |page: FeedPage| page.items.first().map(|item| item.id);
    let userline = svc
        .get_feed(FeedKind::Userline, Some("lois"), None, None)
        .await
        .unwrap();
    assert_eq!(head(userline), Some(tweet.id));
    let public = svc
        .get_feed(FeedKind::Public, None, None, None)
        .await
        .unwrap();
    assert_eq!(head(public), Some(tweet.id));
    for reader in ["lois", "peter", "meg"] {
        let timeline = svc
            .get_feed(FeedKind::Timeline, Some(reader), None, None)
            .await
            .unwrap();
        assert_eq!(head(timeline), Some(tweet.id), "{reader}");
    }
    let chris = svc
        .get_feed(FeedKind::Timeline, Some("chris"), None, None)
        .await
        .unwrap();
    assert!(chris.items.is_empty());
}

#[tokio::test]
async fn paging_is_gap_free_while_writes_continue() {
    let (_, svc) = setup().await;
    let mut expected = Vec::new();
    for n in 0..25 {
        let tweet = svc
            .post_tweet("chris", &format!("tweet {n}"))
            .await
            .unwrap();
        expected.push(tweet.id);
    }

    let mut seen = Vec::new();
    let mut cursor: Option<String> = None;
    let mut interleaved = 0;
    loop {
        let page = svc
            .get_feed(
                FeedKind::Userline,
                Some("chris"),
                cursor.as_deref(),
                Some(7),
            )
            .await
            .unwrap();
        seen.extend(ids(&page));

        // Newer posts must not disturb the pages still to come.
        svc.post_tweet("chris", &format!("interleaved {interleaved}"))
            .await
            .unwrap();
        interleaved += 1;

        match page.next_cursor {
            Some(next) => cursor = Some(next.to_string()),
            None => break,
        }
    }

    expected.reverse();
    assert_eq!(seen, expected);
    assert!(seen.windows(2).all(|w| w[0] > w[1]));
}

// =============================================================================
// Failure handling
// =============================================================================

#[tokio::test]
async fn transient_faults_are_absorbed() {
    let (store, svc) = setup().await;
    svc.follow("lois", "peter").await.unwrap();
    store.fail_next_writes(Table::Timeline, "lois", 2);
    store.fail_next_writes(Table::Userline, "peter", 1);

    let tweet = svc.post_tweet("peter", "Roadhouse").await.unwrap();
    let timeline = svc
        .get_feed(FeedKind::Timeline, Some("lois"), None, None)
        .await
        .unwrap();
    assert_eq!(ids(&timeline), vec![tweet.id]);
}

#[tokio::test]
async fn exhausted_fanout_is_partial_and_tweet_survives() {
    let (store, svc) = setup().await;
    svc.follow("lois", "peter").await.unwrap();
    svc.follow("meg", "peter").await.unwrap();
    store.fail_next_writes(Table::Timeline, "meg", u32::MAX);

    let err = svc.post_tweet("peter", "Freakin' sweet").await.unwrap_err();
    let CoreError::PartialFanoutFailure { tweet_id, failed } = err else {
        panic!("expected partial fan-out failure, got {err}");
    };
    assert_eq!(
        failed.iter().map(|u| u.as_str()).collect::<Vec<_>>(),
        vec!["meg"]
    );

    let tweet = svc.tweet(&tweet_id.to_string()).await.unwrap();
    assert_eq!(tweet.body, "Freakin' sweet");
    let lois = svc
        .get_feed(FeedKind::Timeline, Some("lois"), None, None)
        .await
        .unwrap();
    assert_eq!(ids(&lois), vec![tweet_id]);
    let meg = svc
        .get_feed(FeedKind::Timeline, Some("meg"), None, None)
        .await
        .unwrap();
    assert!(meg.items.is_empty());
}

#[tokio::test(start_paused = true)]
async fn slow_store_times_out_as_unavailable() {
    let store = Arc::new(MemoryStore::new());
    let config = EngineConfig {
        retry: RetryPolicy {
            max_attempts: 2,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(10),
            write_timeout: Duration::from_millis(100),
        },
        ..EngineConfig::default()
    };
    let svc = Twissandra::new(Arc::clone(&store), &config);
    svc.register("herbert").await.unwrap();

    store.set_write_delay(Some(Duration::from_secs(30)));
    let err = svc
        .post_tweet("herbert", "Hello, Christopher")
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::StoreUnavailable(_)), "{err}");
}

#[tokio::test]
async fn malformed_cursor_is_invalid_input() {
    let (_, svc) = setup().await;
    let cursors = [
        "",
        "12345",
        "not-a-uuid",
        "00000000-0000-4000-8000-000000000000",
    ];
    for cursor in cursors {
        let err = svc
            .get_feed(FeedKind::Public, None, Some(cursor), None)
            .await
            .unwrap_err();
        assert!(
            matches!(err, CoreError::InvalidInput(_)),
            "cursor {cursor:?}"
        );
    }
}

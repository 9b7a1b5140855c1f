//! The social graph.
//!
//! Every edge `follower -> followee` is stored twice:
//!
//! | Table | Row | Column | Value |
//! |-------|-----|--------|-------|
//! | [`Table::Following`] | follower | followee | RFC 3339 timestamp |
//! | [`Table::Followers`] | followee | follower | RFC 3339 timestamp |
//!
//! The two writes are separate row operations. Adding writes the following
//! row first and only then the mirror, so a failure can leave an edge in the
//! following index alone, never in the follower index alone. Both writes
//! are idempotent set operations, so re-issuing a failed add repairs it.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use twissandra_db::{Cell, ColumnKey, Scan, Store, Table};
use twissandra_types::{User, Username};

use crate::error::CoreError;
use crate::retry::RetryPolicy;
use crate::users::UserRepository;

/// Page size used when walking a whole follower row.
const SNAPSHOT_PAGE: usize = 5000;

/// Maintains the following and follower indexes.
pub struct SocialGraph<S> {
    store: Arc<S>,
    users: UserRepository<S>,
    retry: RetryPolicy,
}

impl<S> Clone for SocialGraph<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            users: self.users.clone(),
            retry: self.retry,
        }
    }
}

impl<S: Store> SocialGraph<S> {
    /// Create a graph manager over the given store.
    pub fn new(store: Arc<S>, retry: RetryPolicy) -> Self {
        let users = UserRepository::new(Arc::clone(&store), retry);
        Self {
            store,
            users,
            retry,
        }
    }

    /// Make `from` follow every user in `to`.
    ///
    /// Pairs are applied one by one and independently; a failed pair does
    /// not stop the rest. Following someone twice is a no-op apart from
    /// refreshing the edge timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidInput`] (before writing anything) if `to`
    /// contains `from`, and [`CoreError::PartialGraphFailure`] listing the
    /// followees whose edge could not be fully written.
    pub async fn add_friends(&self, from: &Username, to: &[Username]) -> Result<(), CoreError> {
        if to.contains(from) {
            return Err(CoreError::InvalidInput(format!("{from} cannot follow themselves")));
        }

        let since = Utc::now().to_rfc3339();
        let mut failed = Vec::new();
        for followee in to {
            if let Err(err) = self.add_edge(from, followee, since.as_bytes()).await {
                tracing::warn!(
                    follower = %from,
                    followee = %followee,
                    error = %err,
                    "Failed to add follow edge"
                );
                failed.push(followee.clone());
            }
        }

        tracing::info!(
            follower = %from,
            requested = to.len(),
            failed = failed.len(),
            "Follow edges added"
        );
        if failed.is_empty() {
            Ok(())
        } else {
            Err(CoreError::PartialGraphFailure { failed })
        }
    }

    async fn add_edge(
        &self,
        from: &Username,
        to: &Username,
        since: &[u8],
    ) -> Result<(), CoreError> {
        self.put_edge(Table::Following, from, to, since).await?;
        self.put_edge(Table::Followers, to, from, since).await
    }

    /// Make `from` stop following `to`.
    ///
    /// Removing an edge that does not exist succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::StoreUnavailable`] if either index could not be
    /// updated. The call can be repeated safely.
    pub async fn remove_friend(&self, from: &Username, to: &Username) -> Result<(), CoreError> {
        self.delete_edge(Table::Following, from, to).await?;
        self.delete_edge(Table::Followers, to, from).await?;

        tracing::info!(follower = %from, followee = %to, "Follow edge removed");
        Ok(())
    }

    /// Up to `limit` users that `user` follows, in name order.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::StoreUnavailable`] if the index cannot be read.
    pub async fn followees(
        &self,
        user: &Username,
        limit: usize,
    ) -> Result<BTreeSet<Username>, CoreError> {
        let page = Scan::forward(limit);
        let cells = self.scan(Table::Following, user, &page).await?;
        Ok(names(Table::Following, user, &cells).collect())
    }

    /// Up to `limit` users following `user`, in name order.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::StoreUnavailable`] if the index cannot be read.
    pub async fn followers(
        &self,
        user: &Username,
        limit: usize,
    ) -> Result<BTreeSet<Username>, CoreError> {
        let page = Scan::forward(limit);
        let cells = self.scan(Table::Followers, user, &page).await?;
        Ok(names(Table::Followers, user, &cells).collect())
    }

    /// Every follower of `user`, read page by page.
    ///
    /// This is the set a posted tweet is fanned out to. It is a snapshot:
    /// edges added or removed while it is being read may or may not appear.
    /// A page shorter than asked for does not end the walk, since a backend
    /// can drop cells deleted mid-read; only a page with nothing past the
    /// previous bound does.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::StoreUnavailable`] if a page cannot be read.
    pub async fn follower_snapshot(&self, user: &Username) -> Result<Vec<Username>, CoreError> {
        let mut all = Vec::new();
        let mut scan = Scan::forward(SNAPSHOT_PAGE);
        loop {
            let cells = self.scan(Table::Followers, user, &scan).await?;

            // Pages after the first start at the previous page's last column.
            let fresh = match (&scan.from, cells.first()) {
                (Some(from), Some(first)) if first.column == *from => {
                    cells.get(1..).unwrap_or_default()
                }
                _ => cells.as_slice(),
            };
            let Some(last) = fresh.last() else {
                break;
            };
            all.extend(names(Table::Followers, user, fresh));
            scan = Scan::forward(SNAPSHOT_PAGE.saturating_add(1)).starting_at(last.column.clone());
        }
        Ok(all)
    }

    /// Records of up to `limit` users that `user` follows.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::StoreUnavailable`] if a read fails.
    pub async fn friends(&self, user: &Username, limit: usize) -> Result<Vec<User>, CoreError> {
        let names: Vec<Username> = self.followees(user, limit).await?.into_iter().collect();
        self.users.get_many(&names).await
    }

    /// Records of up to `limit` users following `user`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::StoreUnavailable`] if a read fails.
    pub async fn follower_users(
        &self,
        user: &Username,
        limit: usize,
    ) -> Result<Vec<User>, CoreError> {
        let names: Vec<Username> = self.followers(user, limit).await?.into_iter().collect();
        self.users.get_many(&names).await
    }

    async fn put_edge(
        &self,
        table: Table,
        owner: &Username,
        other: &Username,
        since: &[u8],
    ) -> Result<(), CoreError> {
        let row = owner.as_str();
        let column = ColumnKey::from_name(other.as_str());
        self.retry
            .run("put edge", || self.store.put(table, row, &column, since))
            .await
    }

    async fn delete_edge(
        &self,
        table: Table,
        owner: &Username,
        other: &Username,
    ) -> Result<(), CoreError> {
        let row = owner.as_str();
        let column = ColumnKey::from_name(other.as_str());
        self.retry
            .run("delete edge", || self.store.delete(table, row, &column))
            .await
    }

    async fn scan(
        &self,
        table: Table,
        user: &Username,
        scan: &Scan,
    ) -> Result<Vec<Cell>, CoreError> {
        self.retry
            .run("scan graph", || self.store.scan(table, user.as_str(), scan))
            .await
    }
}

/// Decode the column names of a graph row, skipping any that are not valid
/// usernames.
fn names<'a>(
    table: Table,
    owner: &'a Username,
    cells: &'a [Cell],
) -> impl Iterator<Item = Username> + 'a {
    cells.iter().filter_map(move |cell| {
        let name = cell.column.as_name().and_then(|n| Username::new(n).ok());
        if name.is_none() {
            tracing::warn!(table = %table, row = %owner, "Skipping malformed graph column");
        }
        name
    })
}

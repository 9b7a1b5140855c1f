//! The wide-column store contract.
//!
//! Every higher component talks to storage only through [`Store`], which
//! models an ordered key-value store organised as
//! `table -> row key -> (column key -> value)`:
//!
//! - row keys are UTF-8 strings,
//! - column keys are byte strings compared lexicographically, so a
//!   [`TweetId`] stored in big-endian form sorts by time,
//! - values are opaque bytes.
//!
//! A single [`Store::put`] or [`Store::delete`] is atomic within its row.
//! Nothing spans rows: callers that touch several rows must cope with
//! partial application themselves.

use std::collections::BTreeMap;
use std::future::Future;

use twissandra_types::TweetId;

use crate::error::DbError;

/// Logical column families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Table {
    /// User records, one row per username.
    Users,
    /// Tweet records, one row per tweet id.
    Tweets,
    /// Following index: row = follower, columns = followees.
    Following,
    /// Follower index: row = followee, columns = followers.
    Followers,
    /// Userlines (and the public line): row = author, columns = tweet ids.
    Userline,
    /// Timelines: row = reader, columns = tweet ids.
    Timeline,
}

impl Table {
    /// Every table, in declaration order.
    pub const ALL: [Self; 6] = [
        Self::Users,
        Self::Tweets,
        Self::Following,
        Self::Followers,
        Self::Userline,
        Self::Timeline,
    ];

    /// Stable storage name of the table.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Tweets => "tweets",
            Self::Following => "following",
            Self::Followers => "followers",
            Self::Userline => "userline",
            Self::Timeline => "timeline",
        }
    }
}

impl core::fmt::Display for Table {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A column key. Ordered bytewise.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ColumnKey(Vec<u8>);

impl ColumnKey {
    /// Wrap raw bytes.
    pub const fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Column key naming a user (graph indexes) or a record field.
    pub fn from_name(name: &str) -> Self {
        Self(name.as_bytes().to_vec())
    }

    /// Borrow the raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Interpret the key as a tweet id, if it is one.
    pub fn to_tweet_id(&self) -> Option<TweetId> {
        TweetId::from_slice(&self.0)
    }

    /// Interpret the key as UTF-8 text, if it is.
    pub fn as_name(&self) -> Option<&str> {
        std::str::from_utf8(&self.0).ok()
    }
}

impl From<TweetId> for ColumnKey {
    fn from(id: TweetId) -> Self {
        Self(id.to_bytes().to_vec())
    }
}

/// All cells of one row, ordered by column key.
pub type Row = BTreeMap<ColumnKey, Vec<u8>>;

/// A single column/value pair returned by [`Store::scan`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    /// Column key.
    pub column: ColumnKey,
    /// Stored value.
    pub value: Vec<u8>,
}

/// Parameters of a column-range scan within one row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scan {
    /// Inclusive start bound. `None` starts at the first column in scan
    /// direction (the newest one when `reverse` is set).
    pub from: Option<ColumnKey>,
    /// Maximum number of cells to return.
    pub limit: usize,
    /// Walk columns from greatest to least.
    pub reverse: bool,
}

impl Scan {
    /// Forward scan of up to `limit` cells from the first column.
    pub const fn forward(limit: usize) -> Self {
        Self {
            from: None,
            limit,
            reverse: false,
        }
    }

    /// Reverse scan of up to `limit` cells from the greatest column.
    pub const fn newest_first(limit: usize) -> Self {
        Self {
            from: None,
            limit,
            reverse: true,
        }
    }

    /// Start the scan at `column` (inclusive).
    #[must_use]
    pub fn starting_at(mut self, column: ColumnKey) -> Self {
        self.from = Some(column);
        self
    }

    /// Apply this scan to an in-memory row.
    pub fn apply(&self, row: &Row) -> Vec<Cell> {
        let to_cell = |(column, value): (&ColumnKey, &Vec<u8>)| Cell {
            column: column.clone(),
            value: value.clone(),
        };
        match (&self.from, self.reverse) {
            (None, false) => row.iter().take(self.limit).map(to_cell).collect(),
            (None, true) => row.iter().rev().take(self.limit).map(to_cell).collect(),
            (Some(from), false) => row
                .range(from.clone()..)
                .take(self.limit)
                .map(to_cell)
                .collect(),
            (Some(from), true) => row
                .range(..=from.clone())
                .rev()
                .take(self.limit)
                .map(to_cell)
                .collect(),
        }
    }
}

/// An ordered wide-column store with row-scoped atomicity.
///
/// Implementations must be safe to share between concurrent callers; the
/// engine holds one handle behind an `Arc` and issues requests from many
/// tasks at once.
pub trait Store: Send + Sync {
    /// Read every cell of a row.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::RowNotFound`] if the row holds no cells.
    fn get(&self, table: Table, row: &str) -> impl Future<Output = Result<Row, DbError>> + Send;

    /// Read a range of cells from a row. A missing row yields no cells.
    fn scan(
        &self,
        table: Table,
        row: &str,
        scan: &Scan,
    ) -> impl Future<Output = Result<Vec<Cell>, DbError>> + Send;

    /// Insert or overwrite one cell.
    fn put(
        &self,
        table: Table,
        row: &str,
        column: &ColumnKey,
        value: &[u8],
    ) -> impl Future<Output = Result<(), DbError>> + Send;

    /// Remove one cell. Removing an absent cell succeeds.
    fn delete(
        &self,
        table: Table,
        row: &str,
        column: &ColumnKey,
    ) -> impl Future<Output = Result<(), DbError>> + Send;

    /// Read several whole rows at once. Absent rows are left out of the map.
    fn multi_get(
        &self,
        table: Table,
        rows: &[String],
    ) -> impl Future<Output = Result<BTreeMap<String, Row>, DbError>> + Send;
}

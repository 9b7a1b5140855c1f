//! `Dragonfly` (Redis-compatible) backed [`Store`].
//!
//! Each logical row is kept in two keys:
//!
//! | Pattern | Type | Description |
//! |---------|------|-------------|
//! | `{table}:{row}:index` | Sorted set | Hex-encoded column keys, all scored 0 |
//! | `{table}:{row}:cells` | Hash | Hex-encoded column key -> value |
//!
//! With equal scores a sorted set orders members lexicographically, and hex
//! encoding preserves byte order, so `ZRANGEBYLEX`/`ZREVRANGEBYLEX` walk the
//! columns in [`ColumnKey`] order. Both keys of a row are written inside one
//! `MULTI`/`EXEC` block, which keeps single-cell writes row-atomic.

use std::collections::{BTreeMap, HashMap};

use fred::prelude::*;

use crate::error::DbError;
use crate::store::{Cell, ColumnKey, Row, Scan, Store, Table};

/// Connection handle to a `Dragonfly` (Redis-compatible) instance.
///
/// Wraps a [`fred::prelude::Client`], which multiplexes concurrent callers
/// over one connection and is cheap to clone.
#[derive(Clone)]
pub struct DragonflyStore {
    client: Client,
}

fn index_key(table: Table, row: &str) -> String {
    format!("{table}:{row}:index")
}

fn cells_key(table: Table, row: &str) -> String {
    format!("{table}:{row}:cells")
}

fn decode_column(table: Table, row: &str, member: &str) -> Result<ColumnKey, DbError> {
    hex::decode(member)
        .map(ColumnKey::from_bytes)
        .map_err(|e| DbError::Corrupt {
            table,
            row: row.to_owned(),
            reason: format!("column {member:?} is not hex: {e}"),
        })
}

impl DragonflyStore {
    /// Connect to `Dragonfly` at the given URL.
    ///
    /// The URL should follow the Redis URL scheme:
    /// `redis://host:port` or `redis://host:port/db`
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Config`] if the URL cannot be parsed.
    /// Returns [`DbError::Dragonfly`] if the connection fails.
    pub async fn connect(url: &str) -> Result<Self, DbError> {
        let config = Config::from_url(url)
            .map_err(|e| DbError::Config(format!("Invalid Dragonfly URL: {e}")))?;

        let client = Builder::from_config(config).build()?;
        client.init().await?;

        tracing::info!("Connected to Dragonfly");
        Ok(Self { client })
    }

    /// Flush all keys from the `Dragonfly` instance.
    ///
    /// **WARNING:** This deletes all data. Only use for testing.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Dragonfly`] if the flush fails.
    pub async fn flush_all(&self) -> Result<(), DbError> {
        let _: () = self.client.flushall(false).await?;
        Ok(())
    }

    async fn read_row(&self, table: Table, row: &str) -> Result<Option<Row>, DbError> {
        let cells: HashMap<String, Value> = self.client.hgetall(cells_key(table, row)).await?;
        if cells.is_empty() {
            return Ok(None);
        }
        let mut out = Row::new();
        for (member, value) in cells {
            let column = decode_column(table, row, &member)?;
            out.insert(column, value.into_owned_bytes().unwrap_or_default());
        }
        Ok(Some(out))
    }
}

impl Store for DragonflyStore {
    async fn get(&self, table: Table, row: &str) -> Result<Row, DbError> {
        self.read_row(table, row)
            .await?
            .ok_or_else(|| DbError::RowNotFound {
                table,
                row: row.to_owned(),
            })
    }

    async fn scan(&self, table: Table, row: &str, scan: &Scan) -> Result<Vec<Cell>, DbError> {
        if scan.limit == 0 {
            return Ok(Vec::new());
        }
        let bound = scan
            .from
            .as_ref()
            .map(|c| format!("[{}", hex::encode(c.as_bytes())));
        let limit = Some((0, i64::try_from(scan.limit).unwrap_or(i64::MAX)));
        let index = index_key(table, row);

        let members: Vec<String> = if scan.reverse {
            let max = bound.as_deref().unwrap_or("+");
            self.client
                .zrevrangebylex(index.as_str(), max, "-", limit)
                .await?
        } else {
            let min = bound.as_deref().unwrap_or("-");
            self.client
                .zrangebylex(index.as_str(), min, "+", limit)
                .await?
        };
        if members.is_empty() {
            return Ok(Vec::new());
        }

        let values: Vec<Value> = self
            .client
            .hmget(cells_key(table, row), members.clone())
            .await?;

        let mut cells = Vec::with_capacity(members.len());
        for (member, value) in members.iter().zip(values) {
            // A concurrent delete can empty the hash slot between the two reads,
            // so a page may come back shorter than the index range.
            if value.is_null() {
                continue;
            }
            cells.push(Cell {
                column: decode_column(table, row, member)?,
                value: value.into_owned_bytes().unwrap_or_default(),
            });
        }
        Ok(cells)
    }

    async fn put(
        &self,
        table: Table,
        row: &str,
        column: &ColumnKey,
        value: &[u8],
    ) -> Result<(), DbError> {
        let member = hex::encode(column.as_bytes());
        let trx = self.client.multi();
        let _: Value = trx
            .zadd(
                index_key(table, row),
                None,
                None,
                false,
                false,
                (0.0, member.as_str()),
            )
            .await?;
        let _: Value = trx
            .hset(cells_key(table, row), (member.as_str(), value.to_vec()))
            .await?;
        let _: Value = trx.exec(true).await?;
        Ok(())
    }

    async fn delete(&self, table: Table, row: &str, column: &ColumnKey) -> Result<(), DbError> {
        let member = hex::encode(column.as_bytes());
        let trx = self.client.multi();
        let _: Value = trx.zrem(index_key(table, row), member.as_str()).await?;
        let _: Value = trx.hdel(cells_key(table, row), member.as_str()).await?;
        let _: Value = trx.exec(true).await?;
        Ok(())
    }

    async fn multi_get(
        &self,
        table: Table,
        rows: &[String],
    ) -> Result<BTreeMap<String, Row>, DbError> {
        let reads = rows.iter().map(|row| async move {
            self.read_row(table, row)
                .await
                .map(|found| found.map(|cells| (row.clone(), cells)))
        });
        let found = futures::future::try_join_all(reads).await?;
        Ok(found.into_iter().flatten().collect())
    }
}

//! In-process [`Store`] implementation.
//!
//! Holds every table in one `BTreeMap` behind a [`tokio::sync::RwLock`]. Used
//! by the test suites and for throwaway local runs. It can also inject
//! faults: a row can be told to reject its next N writes with
//! [`DbError::Unavailable`], every write can be delayed, and a scan can be
//! made to lose cells. That is how the retry, timeout and short-page paths
//! of the engine are exercised without a real backend.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::RwLock;

use crate::error::DbError;
use crate::store::{Cell, ColumnKey, Row, Scan, Store, Table};

type RowId = (Table, String);

/// A [`Store`] kept entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: RwLock<BTreeMap<RowId, Row>>,
    faults: Mutex<Faults>,
}

#[derive(Debug, Default)]
struct Faults {
    failing_writes: BTreeMap<RowId, u32>,
    short_scans: BTreeMap<RowId, usize>,
    write_delay: Option<Duration>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` writes (puts or deletes) to a row fail with
    /// [`DbError::Unavailable`]. `u32::MAX` keeps the row failing for good.
    pub fn fail_next_writes(&self, table: Table, row: &str, count: u32) {
        let mut faults = self.faults.lock().unwrap_or_else(PoisonError::into_inner);
        if count == 0 {
            faults.failing_writes.remove(&(table, row.to_owned()));
        } else {
            faults.failing_writes.insert((table, row.to_owned()), count);
        }
    }

    /// Delay every subsequent write by `delay` before it is applied.
    pub fn set_write_delay(&self, delay: Option<Duration>) {
        let mut faults = self.faults.lock().unwrap_or_else(PoisonError::into_inner);
        faults.write_delay = delay;
    }

    /// Make the next scan of a row leave out the first `count` cells of its
    /// page, the way a delete landing between the index and value reads of
    /// the Dragonfly backend does.
    pub fn drop_from_next_scan(&self, table: Table, row: &str, count: usize) {
        let mut faults = self.faults.lock().unwrap_or_else(PoisonError::into_inner);
        faults.short_scans.insert((table, row.to_owned()), count);
    }

    /// Number of rows currently holding at least one cell in `table`.
    pub async fn row_count(&self, table: Table) -> usize {
        let rows = self.rows.read().await;
        rows.keys().filter(|(t, _)| *t == table).count()
    }

    /// Consume one injected fault for the row, if any, and return the delay
    /// to apply before writing.
    fn before_write(&self, table: Table, row: &str) -> Result<Option<Duration>, DbError> {
        let mut faults = self.faults.lock().unwrap_or_else(PoisonError::into_inner);
        let key = (table, row.to_owned());
        if let Some(remaining) = faults.failing_writes.get_mut(&key) {
            if *remaining != u32::MAX {
                *remaining = remaining.saturating_sub(1);
            }
            if *remaining == 0 {
                faults.failing_writes.remove(&key);
            }
            return Err(DbError::Unavailable(format!(
                "injected write failure on {table} row {row:?}"
            )));
        }
        Ok(faults.write_delay)
    }

    fn take_short_scan(&self, table: Table, row: &str) -> usize {
        let mut faults = self.faults.lock().unwrap_or_else(PoisonError::into_inner);
        faults
            .short_scans
            .remove(&(table, row.to_owned()))
            .unwrap_or(0)
    }

    async fn pause_for(&self, table: Table, row: &str) -> Result<(), DbError> {
        if let Some(delay) = self.before_write(table, row)? {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }
}

impl Store for MemoryStore {
    async fn get(&self, table: Table, row: &str) -> Result<Row, DbError> {
        let rows = self.rows.read().await;
        rows.get(&(table, row.to_owned()))
            .cloned()
            .ok_or_else(|| DbError::RowNotFound {
                table,
                row: row.to_owned(),
            })
    }

    async fn scan(&self, table: Table, row: &str, scan: &Scan) -> Result<Vec<Cell>, DbError> {
        let dropped = self.take_short_scan(table, row);
        let rows = self.rows.read().await;
        let mut cells = rows
            .get(&(table, row.to_owned()))
            .map(|cells| scan.apply(cells))
            .unwrap_or_default();
        Ok(cells.split_off(dropped.min(cells.len())))
    }

    async fn put(
        &self,
        table: Table,
        row: &str,
        column: &ColumnKey,
        value: &[u8],
    ) -> Result<(), DbError> {
        self.pause_for(table, row).await?;
        let mut rows = self.rows.write().await;
        rows.entry((table, row.to_owned()))
            .or_default()
            .insert(column.clone(), value.to_vec());
        Ok(())
    }

    async fn delete(&self, table: Table, row: &str, column: &ColumnKey) -> Result<(), DbError> {
        self.pause_for(table, row).await?;
        let mut rows = self.rows.write().await;
        let key = (table, row.to_owned());
        if let Some(cells) = rows.get_mut(&key) {
            cells.remove(column);
            if cells.is_empty() {
                rows.remove(&key);
            }
        }
        Ok(())
    }

    async fn multi_get(
        &self,
        table: Table,
        keys: &[String],
    ) -> Result<BTreeMap<String, Row>, DbError> {
        let rows = self.rows.read().await;
        Ok(keys
            .iter()
            .filter_map(|key| {
                rows.get(&(table, key.clone()))
                    .map(|cells| (key.clone(), cells.clone()))
            })
            .collect())
    }
}

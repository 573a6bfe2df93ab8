//! In-memory history source and forecast sink.
//!
//! Backs the server when built without the `db` feature and the test suites.

use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::{Mutex, RwLock};

use super::history::{coerce_rows, RawHistoryRow};
use super::{ForecastSink, HistorySource, StoreError};
use crate::domain::{sort_rows, ForecastRow, HistoryRecord};

#[derive(Default)]
pub struct MemoryStore {
    history: RwLock<Vec<RawHistoryRow>>,
    forecasts: RwLock<Vec<ForecastRow>>,
    /// Fail the next replace after this many rows were staged
    fail_after: Mutex<Option<usize>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_history(records: impl IntoIterator<Item = HistoryRecord>) -> Self {
        let store = Self::new();
        store.insert_history(records);
        store
    }

    pub fn insert_history(&self, records: impl IntoIterator<Item = HistoryRecord>) {
        self.history.write().extend(records.into_iter().map(|r| RawHistoryRow {
            date: r.date,
            category: r.category,
            region: r.region,
            quantity: Some(r.quantity.to_string()),
        }));
    }

    /// Insert a row with an arbitrary textual quantity
    pub fn insert_raw_history(&self, row: RawHistoryRow) {
        self.history.write().push(row);
    }

    /// Seed published rows directly, bypassing the replace path
    pub fn seed_forecasts(&self, rows: Vec<ForecastRow>) {
        *self.forecasts.write() = rows;
    }

    /// Make the next `replace_all` fail once `after_rows` rows were inserted
    pub fn fail_next_replace(&self, after_rows: usize) {
        *self.fail_after.lock() = Some(after_rows);
    }
}

#[async_trait]
impl HistorySource for MemoryStore {
    async fn load_since(&self, since: NaiveDate) -> Result<Vec<HistoryRecord>, StoreError> {
        let mut rows: Vec<RawHistoryRow> = self
            .history
            .read()
            .iter()
            .filter(|r| r.date >= since)
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            (&a.category, &a.region, a.date).cmp(&(&b.category, &b.region, b.date))
        });
        Ok(coerce_rows(rows))
    }
}

#[async_trait]
impl ForecastSink for MemoryStore {
    async fn replace_all(&self, rows: &[ForecastRow]) -> Result<u64, StoreError> {
        let fail_after = self.fail_after.lock().take();

        // Stage delete + insert, then swap so readers see old or new, never both.
        let mut staged: Vec<ForecastRow> = Vec::with_capacity(rows.len());
        for row in rows {
            if fail_after.is_some_and(|limit| staged.len() >= limit) {
                return Err(StoreError::InsertFailed(format!(
                    "simulated failure after {} rows",
                    staged.len()
                )));
            }
            staged.push(row.clone());
        }
        if fail_after.is_some_and(|limit| limit >= rows.len()) {
            return Err(StoreError::InsertFailed("simulated commit failure".to_string()));
        }

        let inserted = staged.len() as u64;
        *self.forecasts.write() = staged;
        Ok(inserted)
    }

    async fn current(&self) -> Result<Vec<ForecastRow>, StoreError> {
        let mut rows = self.forecasts.read().clone();
        sort_rows(&mut rows);
        Ok(rows)
    }

    async fn count(&self) -> Result<u64, StoreError> {
        Ok(self.forecasts.read().len() as u64)
    }
}

use crate::config::Config;
use crate::domain::{ForecastRow, HistoryRecord};
use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::Arc;
use thiserror::Error;

pub mod history;
pub mod memory;
#[cfg(feature = "db")]
pub mod pg;

pub use history::RawHistoryRow;
pub use memory::MemoryStore;

/// Storage failures surfaced by history sources and forecast sinks
#[derive(Debug, Error)]
pub enum StoreError {
    #[cfg(feature = "db")]
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("invalid relation name '{0}'")]
    InvalidRelation(String),

    #[error("insert failed: {0}")]
    InsertFailed(String),
}

/// Upstream daily demand facts
#[async_trait]
pub trait HistorySource: Send + Sync {
    /// All records dated on or after `since`, sorted by (category, region, date)
    async fn load_since(&self, since: NaiveDate) -> Result<Vec<HistoryRecord>, StoreError>;
}

/// Published forecast relation
#[async_trait]
pub trait ForecastSink: Send + Sync {
    /// Delete every row and insert `rows` as one transaction. On error the
    /// previous contents stay intact.
    async fn replace_all(&self, rows: &[ForecastRow]) -> Result<u64, StoreError>;

    /// Currently published rows, sorted by (category, region, forecast_date)
    async fn current(&self) -> Result<Vec<ForecastRow>, StoreError>;

    async fn count(&self) -> Result<u64, StoreError>;
}

pub struct Repositories {
    pub history: Arc<dyn HistorySource>,
    pub forecasts: Arc<dyn ForecastSink>,
}

impl Repositories {
    pub async fn new(cfg: &Config) -> Result<Self> {
        #[cfg(feature = "db")]
        {
            let db = pg::PgRepo::connect(&cfg.db).await?;
            return Ok(Self {
                history: Arc::new(db.history(&cfg.db.history_relation)?),
                forecasts: Arc::new(db.forecasts(&cfg.db.forecast_relation)?),
            });
        }

        #[cfg(not(feature = "db"))]
        {
            let _ = cfg;
            tracing::warn!("built without the db feature, using an empty in-memory store");
            return Ok(Self::in_memory(Arc::new(MemoryStore::new())));
        }
    }

    /// Both roles backed by one in-memory store
    pub fn in_memory(store: Arc<MemoryStore>) -> Self {
        Self {
            history: store.clone(),
            forecasts: store,
        }
    }
}

/// Accept only plain or schema-qualified SQL identifiers, since relation names
/// are interpolated into statements.
pub fn validate_relation(name: &str) -> Result<&str, StoreError> {
    let valid_part = |part: &str| {
        let mut chars = part.chars();
        matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    };
    let parts: Vec<&str> = name.split('.').collect();
    if parts.len() <= 2 && parts.iter().all(|p| valid_part(p)) {
        Ok(name)
    } else {
        Err(StoreError::InvalidRelation(name.to_string()))
    }
}

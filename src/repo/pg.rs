#![cfg(feature = "db")]

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{postgres::PgPoolOptions, PgPool, Postgres, QueryBuilder, Transaction};
use std::time::Duration;
use tracing::{error, info};

use super::history::{coerce_rows, RawHistoryRow};
use super::{validate_relation, ForecastSink, HistorySource, StoreError};
use crate::config::DbConfig;
use crate::domain::{ForecastRow, HistoryRecord};

/// Rows per multi-row INSERT, well below the Postgres bind-parameter limit
const INSERT_CHUNK: usize = 5000;

/// Advisory lock key serializing forecast replaces across processes
const REPLACE_LOCK_KEY: i64 = 0x6465_6d61_6e64;

pub struct PgRepo {
    pub pool: PgPool,
}

impl PgRepo {
    pub async fn connect(cfg: &DbConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(cfg.max_connections)
            .acquire_timeout(Duration::from_secs(cfg.acquire_timeout_secs))
            .connect(&cfg.url)
            .await
            .context("connecting to postgres")?;
        info!(max_connections = cfg.max_connections, "database pool ready");
        Ok(Self { pool })
    }

    pub fn history(&self, relation: &str) -> Result<PgHistorySource, StoreError> {
        Ok(PgHistorySource {
            pool: self.pool.clone(),
            relation: validate_relation(relation)?.to_string(),
        })
    }

    pub fn forecasts(&self, relation: &str) -> Result<PgForecastSink, StoreError> {
        Ok(PgForecastSink {
            pool: self.pool.clone(),
            relation: validate_relation(relation)?.to_string(),
        })
    }
}

/// Reads (date, category, region, quantity) from a warehouse view or table
pub struct PgHistorySource {
    pool: PgPool,
    relation: String,
}

#[async_trait]
impl HistorySource for PgHistorySource {
    async fn load_since(&self, since: NaiveDate) -> Result<Vec<HistoryRecord>, StoreError> {
        let sql = format!(
            r#"
            SELECT date::date AS date,
                   category::text AS category,
                   region::text AS region,
                   quantity::text AS quantity
            FROM {}
            WHERE date >= $1
            ORDER BY category, region, date
            "#,
            self.relation
        );
        let rows: Vec<RawHistoryRow> = sqlx::query_as(&sql)
            .bind(since)
            .fetch_all(&self.pool)
            .await?;

        Ok(coerce_rows(rows))
    }
}

/// Forecast relation with columns
/// (forecast_date, category, region, predicted_quantity, model_identifier)
pub struct PgForecastSink {
    pool: PgPool,
    relation: String,
}

impl PgForecastSink {
    async fn write_all(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        rows: &[ForecastRow],
    ) -> Result<u64, StoreError> {
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(REPLACE_LOCK_KEY)
            .execute(&mut **tx)
            .await?;

        let deleted = sqlx::query(&format!("DELETE FROM {}", self.relation))
            .execute(&mut **tx)
            .await?
            .rows_affected();

        let mut inserted = 0;
        for chunk in rows.chunks(INSERT_CHUNK) {
            let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(format!(
                "INSERT INTO {} (forecast_date, category, region, predicted_quantity, model_identifier) ",
                self.relation
            ));
            qb.push_values(chunk, |mut b, row| {
                b.push_bind(row.forecast_date)
                    .push_bind(row.category.as_str())
                    .push_bind(row.region.as_str())
                    .push_bind(row.predicted_quantity)
                    .push_bind(row.model_identifier.as_str());
            });
            inserted += qb.build().execute(&mut **tx).await?.rows_affected();
        }

        info!(deleted, inserted, relation = %self.relation, "forecast rows replaced");
        Ok(inserted)
    }
}

#[async_trait]
impl ForecastSink for PgForecastSink {
    async fn replace_all(&self, rows: &[ForecastRow]) -> Result<u64, StoreError> {
        let mut tx = self.pool.begin().await?;

        match self.write_all(&mut tx, rows).await {
            Ok(inserted) => {
                tx.commit().await?;
                Ok(inserted)
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    error!(error = %rollback, "rollback of forecast replace failed");
                }
                Err(e)
            }
        }
    }

    async fn current(&self) -> Result<Vec<ForecastRow>, StoreError> {
        let sql = format!(
            r#"
            SELECT forecast_date, category, region,
                   predicted_quantity::float8 AS predicted_quantity,
                   model_identifier
            FROM {}
            ORDER BY category, region, forecast_date
            "#,
            self.relation
        );
        let rows = sqlx::query_as::<_, ForecastRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn count(&self) -> Result<u64, StoreError> {
        let (count,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {}", self.relation))
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> DbConfig {
        DbConfig {
            url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost/demand_test".to_string()),
            max_connections: 2,
            acquire_timeout_secs: 5,
            history_relation: "analytics.ml_daily_demand_category_region".to_string(),
            forecast_relation: "analytics.demand_forecast_15d".to_string(),
        }
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn test_replace_all_round_trip() {
        let repo = PgRepo::connect(&test_config()).await.unwrap();
        let sink = repo.forecasts("analytics.demand_forecast_15d").unwrap();
        let row = ForecastRow {
            forecast_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            category: "Rice".to_string(),
            region: "Dhaka".to_string(),
            predicted_quantity: 4.0,
            model_identifier: "test".to_string(),
        };

        assert_eq!(sink.replace_all(&[row.clone()]).await.unwrap(), 1);
        assert_eq!(sink.current().await.unwrap(), vec![row]);
        assert_eq!(sink.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_rejects_unsafe_relation() {
        let pool = PgPoolOptions::new().connect_lazy("postgres://localhost/unused").unwrap();
        let repo = PgRepo { pool };
        assert!(repo.history("x; DROP TABLE y").is_err());
        assert!(repo.forecasts("analytics.demand_forecast_15d").is_ok());
    }
}

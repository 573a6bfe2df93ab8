//! Refresh pipeline: load history, forecast recursively, republish.

use chrono::{Duration, Local, NaiveDate};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::ForecastConfig;
use crate::domain::{group_into_series, RefreshSummary};
use crate::forecast::{ForecastError, ForecastPublisher, RecursiveForecaster};
use crate::ml::DemandPredictor;
use crate::repo::{ForecastSink, HistorySource, StoreError};

#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("no history data found in the last {lookback_days} days")]
    NoData { lookback_days: u32 },

    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("loading history failed: {0}")]
    History(#[source] StoreError),

    #[error(transparent)]
    Forecast(#[from] ForecastError),

    #[error("publishing forecast failed: {0}")]
    Publish(#[source] StoreError),
}

/// Validated trigger parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshParams {
    pub horizon: u32,
    pub lookback_days: u32,
}

pub struct RefreshService {
    history: Arc<dyn HistorySource>,
    forecaster: RecursiveForecaster,
    publisher: ForecastPublisher,
    settings: ForecastConfig,
}

impl RefreshService {
    pub fn new(
        history: Arc<dyn HistorySource>,
        predictor: Arc<dyn DemandPredictor>,
        sink: Arc<dyn ForecastSink>,
        settings: ForecastConfig,
    ) -> Self {
        Self {
            history,
            forecaster: RecursiveForecaster::new(predictor),
            publisher: ForecastPublisher::new(sink),
            settings,
        }
    }

    pub fn forecasts(&self) -> &Arc<dyn ForecastSink> {
        self.publisher.sink()
    }

    pub fn model_identifier(&self) -> &str {
        self.forecaster.model_identifier()
    }

    /// Fill in defaults and check bounds.
    pub fn resolve(
        &self,
        horizon: Option<u32>,
        lookback_days: Option<u32>,
    ) -> Result<RefreshParams, RefreshError> {
        let s = &self.settings;
        let horizon = horizon.unwrap_or(s.default_horizon);
        let lookback_days = lookback_days.unwrap_or(s.default_lookback_days);

        if horizon == 0 || horizon > s.max_horizon {
            return Err(RefreshError::InvalidParameters(format!(
                "horizon must be between 1 and {}, got {}",
                s.max_horizon, horizon
            )));
        }
        if lookback_days == 0 || lookback_days > s.max_lookback_days {
            return Err(RefreshError::InvalidParameters(format!(
                "lookback_days must be between 1 and {}, got {}",
                s.max_lookback_days, lookback_days
            )));
        }
        Ok(RefreshParams {
            horizon,
            lookback_days,
        })
    }

    /// Run a refresh anchored on the local calendar date.
    pub async fn refresh(&self, params: RefreshParams) -> Result<RefreshSummary, RefreshError> {
        self.refresh_as_of(params, Local::now().date_naive()).await
    }

    /// Run a refresh with an explicit "today" for the lookback window.
    ///
    /// Nothing is written unless every series was forecast successfully.
    pub async fn refresh_as_of(
        &self,
        params: RefreshParams,
        today: NaiveDate,
    ) -> Result<RefreshSummary, RefreshError> {
        let started = Instant::now();
        let since = today - Duration::days(i64::from(params.lookback_days));
        info!(
            horizon = params.horizon,
            lookback_days = params.lookback_days,
            %since,
            "forecast refresh started"
        );

        let records = self
            .history
            .load_since(since)
            .await
            .map_err(RefreshError::History)?;
        if records.is_empty() {
            warn!(%since, "no history rows, skipping refresh");
            return Err(RefreshError::NoData {
                lookback_days: params.lookback_days,
            });
        }

        let record_count = records.len();
        let series = group_into_series(records);
        let series_count = series.len();
        info!(records = record_count, series = series_count, "history loaded");

        let rows = self
            .forecaster
            .forecast_concurrent(series, params.horizon, self.settings.workers)
            .await?;
        let first_forecast_date = rows.iter().map(|r| r.forecast_date).min();
        let last_forecast_date = rows.iter().map(|r| r.forecast_date).max();

        let model_identifier = self.model_identifier().to_string();
        let saved_rows = self
            .publisher
            .publish(rows, &model_identifier)
            .await
            .map_err(RefreshError::Publish)?;

        info!(
            saved_rows,
            series = series_count,
            duration_ms = started.elapsed().as_millis() as u64,
            "forecast refresh finished"
        );

        Ok(RefreshSummary {
            horizon: params.horizon,
            lookback_days: params.lookback_days,
            series_count,
            saved_rows,
            model_identifier,
            first_forecast_date,
            last_forecast_date,
        })
    }
}

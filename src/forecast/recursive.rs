use chrono::{Duration, NaiveDate};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, info};

use super::features::{FeatureWindow, MAX_LAG};
use super::ForecastError;
use crate::domain::{sort_rows, ForecastRow, Series};
use crate::ml::{DemandPredictor, PredictorInput};

/// Multi-day forecaster that feeds each day's prediction back in as history.
#[derive(Clone)]
pub struct RecursiveForecaster {
    predictor: Arc<dyn DemandPredictor>,
}

impl RecursiveForecaster {
    pub fn new(predictor: Arc<dyn DemandPredictor>) -> Self {
        Self { predictor }
    }

    pub fn model_identifier(&self) -> &str {
        self.predictor.identifier()
    }

    /// Forecast every series sequentially.
    ///
    /// Rows are sorted by (category, region, forecast_date). Any failing series
    /// fails the whole call.
    pub fn forecast(&self, series: &[Series], horizon: u32) -> Result<Vec<ForecastRow>, ForecastError> {
        let axis = future_dates(series, horizon);
        let mut rows = self.forecast_chunk(series, &axis)?;
        sort_rows(&mut rows);
        Ok(rows)
    }

    /// Forecast series across up to `workers` blocking tasks.
    ///
    /// Series are independent so they may run in parallel; each walk is still
    /// strictly sequential. Output is identical to [`Self::forecast`].
    pub async fn forecast_concurrent(
        &self,
        series: Vec<Series>,
        horizon: u32,
        workers: usize,
    ) -> Result<Vec<ForecastRow>, ForecastError> {
        let axis: Arc<[NaiveDate]> = future_dates(&series, horizon).into();
        let chunk_size = series.len().div_ceil(workers.max(1)).max(1);

        let mut set = JoinSet::new();
        let mut remaining = series.into_iter().peekable();
        while remaining.peek().is_some() {
            let chunk: Vec<Series> = remaining.by_ref().take(chunk_size).collect();
            let forecaster = self.clone();
            let axis = axis.clone();
            set.spawn_blocking(move || forecaster.forecast_chunk(&chunk, &axis));
        }

        let mut rows = Vec::new();
        while let Some(joined) = set.join_next().await {
            let chunk_rows = joined.map_err(|e| ForecastError::Worker(e.to_string()))??;
            rows.extend(chunk_rows);
        }
        sort_rows(&mut rows);
        Ok(rows)
    }

    fn forecast_chunk(&self, series: &[Series], axis: &[NaiveDate]) -> Result<Vec<ForecastRow>, ForecastError> {
        let mut rows = Vec::with_capacity(series.len() * axis.len());
        for s in series {
            rows.extend(self.forecast_series(s, axis)?);
        }
        Ok(rows)
    }

    /// Walk one series across the shared future-date axis.
    pub fn forecast_series(&self, series: &Series, axis: &[NaiveDate]) -> Result<Vec<ForecastRow>, ForecastError> {
        let key = &series.key;
        let cold = series.len() < MAX_LAG;
        if cold {
            debug!(series = %key, points = series.len(), "cold start, forecasting zeros");
        }

        let mut window = FeatureWindow::from_points(series.points());
        let mut rows = Vec::with_capacity(axis.len());

        for &date in axis {
            let features = window.next_row(date);
            let value = match PredictorInput::from_row(key, &features) {
                Some(input) if !cold => {
                    let raw = self.predictor.predict(&input).map_err(|e| ForecastError::Prediction {
                        category: key.category.clone(),
                        region: key.region.clone(),
                        date,
                        message: e.to_string(),
                    })?;
                    if !raw.is_finite() {
                        return Err(ForecastError::Prediction {
                            category: key.category.clone(),
                            region: key.region.clone(),
                            date,
                            message: format!("predictor returned non-finite value {raw}"),
                        });
                    }
                    raw.max(0.0)
                }
                _ => 0.0,
            };

            window.push(value);
            rows.push(ForecastRow {
                forecast_date: date,
                category: key.category.clone(),
                region: key.region.clone(),
                predicted_quantity: value,
                model_identifier: self.model_identifier().to_string(),
            });
        }

        Ok(rows)
    }
}

/// `horizon` consecutive days starting the day after the latest date in any
/// series. Empty when there is no history.
pub fn future_dates(series: &[Series], horizon: u32) -> Vec<NaiveDate> {
    let Some(latest) = series.iter().filter_map(Series::last_date).max() else {
        return Vec::new();
    };
    let axis: Vec<NaiveDate> = (1..=i64::from(horizon))
        .map(|offset| latest + Duration::days(offset))
        .collect();
    info!(%latest, horizon, "forecast axis anchored");
    axis
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{group_into_series, DemandPoint, HistoryRecord, SeriesKey};
    use crate::forecast::features::build_features;
    use anyhow::Result;
    use parking_lot::Mutex;
    use std::collections::BTreeSet;

    /// Predicts the rolling mean plus an offset and records every input.
    struct MeanPredictor {
        offset: f64,
        calls: Mutex<Vec<PredictorInput>>,
    }

    impl MeanPredictor {
        fn new(offset: f64) -> Arc<Self> {
            Arc::new(Self {
                offset,
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    impl DemandPredictor for MeanPredictor {
        fn predict(&self, input: &PredictorInput) -> Result<f64> {
            self.calls.lock().push(input.clone());
            Ok(input.rolling_mean_7 + self.offset)
        }

        fn identifier(&self) -> &str {
            "mean_test_v1"
        }
    }

    struct FailingPredictor;

    impl DemandPredictor for FailingPredictor {
        fn predict(&self, input: &PredictorInput) -> Result<f64> {
            if input.category == "Oil" {
                anyhow::bail!("model rejected input");
            }
            Ok(1.0)
        }

        fn identifier(&self) -> &str {
            "failing"
        }
    }

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()
    }

    fn records(category: &str, region: &str, values: &[f64]) -> Vec<HistoryRecord> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| HistoryRecord::new(start() + Duration::days(i as i64), category, region, *v))
            .collect()
    }

    const RICE: [f64; 20] = [
        10.0, 12.0, 9.0, 11.0, 13.0, 10.0, 12.0, 14.0, 11.0, 13.0, 15.0, 12.0, 14.0, 16.0, 13.0,
        15.0, 17.0, 14.0, 16.0, 18.0,
    ];

    #[test]
    fn test_rice_dhaka_end_to_end() {
        let predictor = MeanPredictor::new(0.5);
        let forecaster = RecursiveForecaster::new(predictor.clone());
        let series = group_into_series(records("Rice", "Dhaka", &RICE));

        let rows = forecaster.forecast(&series, 3).unwrap();

        let last = start() + Duration::days(19);
        let dates: Vec<_> = rows.iter().map(|r| r.forecast_date).collect();
        assert_eq!(dates, vec![last + Duration::days(1), last + Duration::days(2), last + Duration::days(3)]);
        assert!(rows.iter().all(|r| r.predicted_quantity >= 0.0));
        assert!(rows.iter().all(|r| r.model_identifier == "mean_test_v1"));

        let calls = predictor.calls.lock();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0].lag_1, 18.0);
        assert_eq!(calls[1].lag_1, rows[0].predicted_quantity);
        assert_eq!(calls[2].lag_1, rows[1].predicted_quantity);
        assert_eq!(calls[0].lag_14, RICE[6]);
    }

    #[test]
    fn test_matches_full_feature_rebuild_each_step() {
        let predictor = MeanPredictor::new(-0.25);
        let forecaster = RecursiveForecaster::new(predictor.clone());
        let series = group_into_series(records("Rice", "Dhaka", &RICE));
        let rows = forecaster.forecast(&series, 10).unwrap();

        // Naive walk: append, rebuild every feature, read the last row.
        let key = SeriesKey::new("Rice", "Dhaka");
        let mut points = series[0].points().to_vec();
        for row in &rows {
            points.push(DemandPoint::new(row.forecast_date, f64::NAN));
            let features = build_features(&points);
            let last = features.last().unwrap();
            let input = PredictorInput::from_row(&key, last).unwrap();
            let expected = (input.rolling_mean_7 - 0.25).max(0.0);
            assert_eq!(row.predicted_quantity, expected);
            points.last_mut().unwrap().quantity = expected;
        }
    }

    #[test]
    fn test_cold_start_series_is_all_zero_and_never_predicted() {
        let predictor = MeanPredictor::new(100.0);
        let forecaster = RecursiveForecaster::new(predictor.clone());
        let series = group_into_series(records("Salt", "Rajshahi", &[5.0; 10]));

        let rows = forecaster.forecast(&series, 15).unwrap();
        assert_eq!(rows.len(), 15);
        assert!(rows.iter().all(|r| r.predicted_quantity == 0.0));
        assert!(predictor.calls.lock().is_empty());
    }

    #[test]
    fn test_negative_predictions_are_clamped() {
        let forecaster = RecursiveForecaster::new(MeanPredictor::new(-1_000.0));
        let series = group_into_series(records("Rice", "Dhaka", &RICE));
        let rows = forecaster.forecast(&series, 5).unwrap();
        assert!(rows.iter().all(|r| r.predicted_quantity == 0.0));
    }

    #[test]
    fn test_shared_axis_across_series() {
        let forecaster = RecursiveForecaster::new(MeanPredictor::new(0.0));
        let mut history = records("Rice", "Dhaka", &RICE);
        history.extend(records("Oil", "Khulna", &RICE[..16]));
        let series = group_into_series(history);

        let rows = forecaster.forecast(&series, 4).unwrap();
        assert_eq!(rows.len(), 8);

        let axis: BTreeSet<_> = rows.iter().map(|r| r.forecast_date).collect();
        assert_eq!(axis.len(), 4);
        assert_eq!(*axis.iter().next().unwrap(), start() + Duration::days(20));
        // Oil/Khulna sorts first
        assert_eq!(rows[0].category, "Oil");
    }

    #[test]
    fn test_prediction_error_carries_context() {
        let forecaster = RecursiveForecaster::new(Arc::new(FailingPredictor));
        let mut history = records("Rice", "Dhaka", &RICE);
        history.extend(records("Oil", "Khulna", &RICE));
        let series = group_into_series(history);

        match forecaster.forecast(&series, 2) {
            Err(ForecastError::Prediction { category, region, date, .. }) => {
                assert_eq!(category, "Oil");
                assert_eq!(region, "Khulna");
                assert_eq!(date, start() + Duration::days(20));
            }
            other => panic!("expected prediction error, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_history_yields_no_rows() {
        let forecaster = RecursiveForecaster::new(MeanPredictor::new(0.0));
        assert!(forecaster.forecast(&[], 15).unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_matches_sequential() {
        let forecaster = RecursiveForecaster::new(MeanPredictor::new(0.3));
        let mut history = Vec::new();
        for (i, region) in ["Dhaka", "Khulna", "Sylhet", "Barisal", "Rangpur"].iter().enumerate() {
            let values: Vec<f64> = RICE.iter().map(|v| v + i as f64).collect();
            history.extend(records("Rice", region, &values));
        }
        let series = group_into_series(history);

        let sequential = forecaster.forecast(&series, 7).unwrap();
        let concurrent = forecaster.forecast_concurrent(series, 7, 3).await.unwrap();
        assert_eq!(sequential, concurrent);
    }
}

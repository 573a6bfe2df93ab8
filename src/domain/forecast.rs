use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One published forecast value for a future day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct ForecastRow {
    pub forecast_date: NaiveDate,
    pub category: String,
    pub region: String,
    pub predicted_quantity: f64,
    pub model_identifier: String,
}

/// Sort rows by (category, region, forecast_date), the order the pipeline
/// emits and the sinks return.
pub fn sort_rows(rows: &mut [ForecastRow]) {
    rows.sort_by(|a, b| {
        a.category
            .cmp(&b.category)
            .then_with(|| a.region.cmp(&b.region))
            .then_with(|| a.forecast_date.cmp(&b.forecast_date))
    });
}

/// Outcome of a successful refresh run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshSummary {
    pub horizon: u32,
    pub lookback_days: u32,
    pub series_count: usize,
    pub saved_rows: u64,
    pub model_identifier: String,
    pub first_forecast_date: Option<NaiveDate>,
    pub last_forecast_date: Option<NaiveDate>,
}

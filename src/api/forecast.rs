use axum::extract::{rejection::QueryRejection, Query, State};
use serde::Deserialize;
use std::time::Instant;
use validator::Validate;

use crate::{
    api::{error::ApiError, response::ApiResponse},
    controller::AppState,
    domain::{ForecastRow, RefreshSummary},
};

/// Refresh trigger parameters; missing values fall back to configured defaults
#[derive(Debug, Default, Deserialize, Validate)]
pub struct RefreshQuery {
    #[validate(range(min = 1))]
    pub horizon: Option<u32>,
    #[serde(alias = "days_back")]
    #[validate(range(min = 1))]
    pub lookback_days: Option<u32>,
}

/// POST|GET /api/v1/forecast/refresh - recompute and republish the forecast
pub async fn trigger_refresh(
    State(st): State<AppState>,
    query: Result<Query<RefreshQuery>, QueryRejection>,
) -> Result<ApiResponse<RefreshSummary>, ApiError> {
    let Query(q) = query?;
    q.validate()?;
    let params = st.refresh.resolve(q.horizon, q.lookback_days)?;

    let started = Instant::now();
    let summary = st.refresh.refresh(params).await?;

    Ok(ApiResponse::success(summary).with_duration(started.elapsed().as_millis() as u64))
}

/// GET /api/v1/forecast - currently published forecast rows
pub async fn get_forecast(
    State(st): State<AppState>,
) -> Result<ApiResponse<Vec<ForecastRow>>, ApiError> {
    let rows = st.refresh.forecasts().current().await?;
    let count = rows.len();
    Ok(ApiResponse::success(rows).with_count(count))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_query_validation() {
        let ok = RefreshQuery { horizon: Some(15), lookback_days: None };
        assert!(ok.validate().is_ok());

        let zero = RefreshQuery { horizon: Some(0), lookback_days: Some(365) };
        assert!(zero.validate().is_err());

        assert!(RefreshQuery::default().validate().is_ok());
    }

    #[test]
    fn test_days_back_alias() {
        let q: RefreshQuery = serde_json::from_str(r#"{"horizon": 3, "days_back": 90}"#).unwrap();
        assert_eq!(q.horizon, Some(3));
        assert_eq!(q.lookback_days, Some(90));
    }
}

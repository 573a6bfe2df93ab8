use axum::{routing::get, Router};

use crate::{api::forecast, controller::AppState};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/forecast", get(forecast::get_forecast))
        .route(
            "/forecast/refresh",
            get(forecast::trigger_refresh).post(forecast::trigger_refresh),
        )
}

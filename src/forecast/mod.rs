pub mod features;
pub mod publisher;
pub mod recursive;

pub use features::{build_features, FeatureRow, FeatureWindow};
pub use publisher::ForecastPublisher;
pub use recursive::{future_dates, RecursiveForecaster};

use chrono::NaiveDate;
use thiserror::Error;

/// Failures of the recursive walk. Any of these aborts the whole run.
#[derive(Debug, Error)]
pub enum ForecastError {
    #[error("prediction failed for {category}/{region} on {date}: {message}")]
    Prediction {
        category: String,
        region: String,
        date: NaiveDate,
        message: String,
    },

    #[error("forecast worker failed: {0}")]
    Worker(String),
}

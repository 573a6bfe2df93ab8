//! Predictor seam for the demand forecaster
//!
//! The forecaster only needs an already-trained, deterministic function from a
//! fixed feature vector to a quantity plus an identifier to stamp on published
//! rows. Training and model persistence live outside this service.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::domain::SeriesKey;
use crate::forecast::features::FeatureRow;

pub mod models;

pub use models::LinearDemandModel;

/// Trait for pre-trained demand models
pub trait DemandPredictor: Send + Sync {
    /// Raw prediction for one feature vector. May be negative; callers clamp.
    fn predict(&self, input: &PredictorInput) -> Result<f64>;

    /// Version identifier tagged onto every published row
    fn identifier(&self) -> &str;
}

/// Feature vector handed to a [`DemandPredictor`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictorInput {
    pub category: String,
    pub region: String,
    pub day_of_week: u32,
    pub month: u32,
    pub is_weekend: bool,
    pub lag_1: f64,
    pub lag_7: f64,
    pub lag_14: f64,
    pub rolling_mean_7: f64,
}

impl PredictorInput {
    /// Returns `None` while any lag or rolling feature is still undefined.
    pub fn from_row(key: &SeriesKey, row: &FeatureRow) -> Option<Self> {
        Some(Self {
            category: key.category.clone(),
            region: key.region.clone(),
            day_of_week: row.day_of_week,
            month: row.month,
            is_weekend: row.is_weekend,
            lag_1: row.lag_1?,
            lag_7: row.lag_7?,
            lag_14: row.lag_14?,
            rolling_mean_7: row.rolling_mean_7?,
        })
    }

    /// Numeric part of the vector in model column order
    pub fn numeric(&self) -> [f64; 7] {
        [
            self.day_of_week as f64,
            self.month as f64,
            if self.is_weekend { 1.0 } else { 0.0 },
            self.lag_1,
            self.lag_7,
            self.lag_14,
            self.rolling_mean_7,
        ]
    }
}

/// Column names matching [`PredictorInput::numeric`]
pub const NUMERIC_FEATURES: [&str; 7] = [
    "day_of_week",
    "month",
    "is_weekend",
    "lag_1",
    "lag_7",
    "lag_14",
    "rolling_mean_7",
];

/// ML Model Metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub model_id: String,
    pub version: String,
    #[serde(default)]
    pub trained_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    pub training_samples: Option<usize>,
}

impl ModelMetadata {
    /// `model_id` and `version` joined the way rows are tagged
    pub fn identifier(&self) -> String {
        if self.version.is_empty() {
            self.model_id.clone()
        } else {
            format!("{}_{}", self.model_id, self.version)
        }
    }
}

//! Feature engineering for the demand forecaster
//!
//! Features are derived per series: calendar fields of the position's date plus
//! lagged quantities and a trailing mean over prior positions. Lags are
//! positional, so a calendar gap in a series is not filled in.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::domain::DemandPoint;

/// Longest lag any feature looks back
pub const MAX_LAG: usize = 14;
/// Trailing window of the rolling mean
pub const ROLLING_WINDOW: usize = 7;

/// Feature vector for one series position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub date: NaiveDate,
    /// Day of week (0=Monday, 6=Sunday)
    pub day_of_week: u32,
    /// Month (1-12)
    pub month: u32,
    /// Is weekend (Saturday or Sunday)
    pub is_weekend: bool,
    pub lag_1: Option<f64>,
    pub lag_7: Option<f64>,
    pub lag_14: Option<f64>,
    /// Mean of the 7 values before this position
    pub rolling_mean_7: Option<f64>,
}

impl FeatureRow {
    /// Whether every lag and rolling feature is defined
    pub fn is_complete(&self) -> bool {
        self.lag_1.is_some()
            && self.lag_7.is_some()
            && self.lag_14.is_some()
            && self.rolling_mean_7.is_some()
    }
}

/// Build one feature row per position of a single date-ordered series.
///
/// Pure: every call recomputes from scratch and only sees the given series.
pub fn build_features(points: &[DemandPoint]) -> Vec<FeatureRow> {
    let values: Vec<f64> = points.iter().map(|p| p.quantity).collect();
    points
        .iter()
        .enumerate()
        .map(|(i, p)| feature_row(p.date, &values[..i]))
        .collect()
}

/// Feature row for `date` given the values strictly before it, oldest first.
fn feature_row(date: NaiveDate, prior: &[f64]) -> FeatureRow {
    let day_of_week = date.weekday().num_days_from_monday();
    let lag = |k: usize| prior.len().checked_sub(k).map(|idx| prior[idx]);
    let rolling_mean_7 = (prior.len() >= ROLLING_WINDOW).then(|| {
        let window = &prior[prior.len() - ROLLING_WINDOW..];
        window.iter().sum::<f64>() / ROLLING_WINDOW as f64
    });

    FeatureRow {
        date,
        day_of_week,
        month: date.month(),
        is_weekend: day_of_week >= 5, // Saturday (5) or Sunday (6)
        lag_1: lag(1),
        lag_7: lag(7),
        lag_14: lag(MAX_LAG),
        rolling_mean_7,
    }
}

/// Bounded incremental feature state for a series being extended.
///
/// Keeps only the last [`MAX_LAG`] values, which is all any feature reads, and
/// produces exactly the row `build_features` would give at the next position.
#[derive(Debug, Clone)]
pub struct FeatureWindow {
    recent: VecDeque<f64>,
}

impl FeatureWindow {
    pub fn from_points(points: &[DemandPoint]) -> Self {
        let skip = points.len().saturating_sub(MAX_LAG);
        Self {
            recent: points[skip..].iter().map(|p| p.quantity).collect(),
        }
    }

    /// Features for a new position dated `date` appended after the window
    pub fn next_row(&mut self, date: NaiveDate) -> FeatureRow {
        feature_row(date, self.recent.make_contiguous())
    }

    /// Record the value at the newly appended position
    pub fn push(&mut self, value: f64) {
        if self.recent.len() == MAX_LAG {
            self.recent.pop_front();
        }
        self.recent.push_back(value);
    }
}

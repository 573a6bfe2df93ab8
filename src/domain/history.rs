use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One daily sales aggregate for a (category, region) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub date: NaiveDate,
    pub category: String,
    pub region: String,
    pub quantity: f64,
}

impl HistoryRecord {
    pub fn new(
        date: NaiveDate,
        category: impl Into<String>,
        region: impl Into<String>,
        quantity: f64,
    ) -> Self {
        Self {
            date,
            category: category.into(),
            region: region.into(),
            quantity,
        }
    }
}

/// Identity of a demand series. Orders by category, then region.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SeriesKey {
    pub category: String,
    pub region: String,
}

impl SeriesKey {
    pub fn new(category: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            region: region.into(),
        }
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.category, self.region)
    }
}

/// A single observed day in a series
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DemandPoint {
    pub date: NaiveDate,
    pub quantity: f64,
}

impl DemandPoint {
    pub fn new(date: NaiveDate, quantity: f64) -> Self {
        Self { date, quantity }
    }
}

/// Date-ordered history of one (category, region) pair.
///
/// Invariant: points are strictly increasing by date.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub key: SeriesKey,
    points: Vec<DemandPoint>,
}

impl Series {
    /// Build a series from unordered points. Points sharing a date are summed.
    pub fn from_points(key: SeriesKey, points: impl IntoIterator<Item = DemandPoint>) -> Self {
        let mut by_date: BTreeMap<NaiveDate, DemandPoint> = BTreeMap::new();
        for p in points {
            by_date
                .entry(p.date)
                .and_modify(|existing| existing.quantity += p.quantity)
                .or_insert(p);
        }
        Self {
            key,
            points: by_date.into_values().collect(),
        }
    }

    pub fn points(&self) -> &[DemandPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.points.last().map(|p| p.date)
    }
}

/// Group flat records into one series per key, sorted by key.
///
/// Duplicate (date, category, region) records are merged by summing, matching
/// the `SUM(...) GROUP BY` the warehouse applies upstream.
pub fn group_into_series(records: impl IntoIterator<Item = HistoryRecord>) -> Vec<Series> {
    let mut grouped: BTreeMap<SeriesKey, Vec<DemandPoint>> = BTreeMap::new();
    for r in records {
        grouped
            .entry(SeriesKey::new(r.category, r.region))
            .or_default()
            .push(DemandPoint::new(r.date, r.quantity));
    }
    grouped
        .into_iter()
        .map(|(key, points)| Series::from_points(key, points))
        .collect()
}

/// Best-effort numeric coercion for source quantities.
///
/// Returns the coerced value and whether coercion changed the input.
/// Unparseable or non-finite values become 0.0; negatives are clamped to 0.0.
pub fn coerce_quantity(raw: Option<&str>) -> (f64, bool) {
    match raw.map(str::trim).and_then(|s| s.parse::<f64>().ok()) {
        Some(v) if v.is_finite() && v >= 0.0 => (v, false),
        _ => (0.0, true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
    }

    #[test]
    fn test_group_into_series_orders_keys_and_dates() {
        let records = vec![
            HistoryRecord::new(day(3), "Rice", "Dhaka", 3.0),
            HistoryRecord::new(day(1), "Rice", "Dhaka", 1.0),
            HistoryRecord::new(day(2), "Oil", "Khulna", 5.0),
            HistoryRecord::new(day(2), "Rice", "Dhaka", 2.0),
        ];

        let series = group_into_series(records);
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].key, SeriesKey::new("Oil", "Khulna"));
        assert_eq!(series[1].key, SeriesKey::new("Rice", "Dhaka"));

        let dates: Vec<_> = series[1].points().iter().map(|p| p.date).collect();
        assert_eq!(dates, vec![day(1), day(2), day(3)]);
    }

    #[test]
    fn test_duplicate_dates_are_summed() {
        let key = SeriesKey::new("Rice", "Dhaka");
        let series = Series::from_points(
            key,
            vec![
                DemandPoint::new(day(1), 4.0),
                DemandPoint::new(day(1), 6.0),
            ],
        );
        assert_eq!(series.len(), 1);
        assert_eq!(series.points()[0].quantity, 10.0);
    }

    #[test]
    fn test_coerce_quantity() {
        assert_eq!(coerce_quantity(Some("12.5")), (12.5, false));
        assert_eq!(coerce_quantity(Some(" 7 ")), (7.0, false));
        assert_eq!(coerce_quantity(Some("n/a")), (0.0, true));
        assert_eq!(coerce_quantity(Some("NaN")), (0.0, true));
        assert_eq!(coerce_quantity(Some("-3")), (0.0, true));
        assert_eq!(coerce_quantity(None), (0.0, true));
    }

    #[test]
    fn test_series_key_display() {
        assert_eq!(SeriesKey::new("Rice", "Dhaka").to_string(), "Rice/Dhaka");
    }
}

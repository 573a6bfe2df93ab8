//! History rows as delivered by a source, before numeric coercion

use chrono::NaiveDate;
use tracing::warn;

use crate::domain::{coerce_quantity, HistoryRecord};

/// Row shape of the history relation. Quantity is kept as text so dirty
/// values can be coerced instead of failing the query.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct RawHistoryRow {
    pub date: NaiveDate,
    pub category: String,
    pub region: String,
    pub quantity: Option<String>,
}

/// Convert raw rows into records, coercing bad quantities to zero.
pub fn coerce_rows(rows: Vec<RawHistoryRow>) -> Vec<HistoryRecord> {
    let mut coerced = 0usize;
    let records: Vec<HistoryRecord> = rows
        .into_iter()
        .map(|row| {
            let (quantity, changed) = coerce_quantity(row.quantity.as_deref());
            if changed {
                coerced += 1;
            }
            HistoryRecord {
                date: row.date,
                category: row.category,
                region: row.region,
                quantity,
            }
        })
        .collect();

    if coerced > 0 {
        warn!(coerced, total = records.len(), "coerced unusable history quantities to zero");
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coerce_rows() {
        let date = NaiveDate::from_ymd_opt(2025, 2, 1).unwrap();
        let raw = |q: Option<&str>| RawHistoryRow {
            date,
            category: "Rice".to_string(),
            region: "Dhaka".to_string(),
            quantity: q.map(str::to_string),
        };

        let records = coerce_rows(vec![raw(Some("4.5")), raw(Some("oops")), raw(None)]);
        let quantities: Vec<f64> = records.iter().map(|r| r.quantity).collect();
        assert_eq!(quantities, vec![4.5, 0.0, 0.0]);
    }
}

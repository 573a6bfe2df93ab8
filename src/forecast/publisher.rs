use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::domain::ForecastRow;
use crate::repo::{ForecastSink, StoreError};

/// Republishes the forecast relation with all-or-nothing replaces.
///
/// At most one replace is in flight per publisher; later callers wait their
/// turn. Sinks add their own cross-process locking.
pub struct ForecastPublisher {
    sink: Arc<dyn ForecastSink>,
    gate: Mutex<()>,
}

impl ForecastPublisher {
    pub fn new(sink: Arc<dyn ForecastSink>) -> Self {
        Self {
            sink,
            gate: Mutex::new(()),
        }
    }

    pub fn sink(&self) -> &Arc<dyn ForecastSink> {
        &self.sink
    }

    /// Tag every row with `model_identifier` and replace the published set.
    pub async fn publish(
        &self,
        mut rows: Vec<ForecastRow>,
        model_identifier: &str,
    ) -> Result<u64, StoreError> {
        for row in rows.iter_mut() {
            row.model_identifier = model_identifier.to_string();
        }

        let _guard = self.gate.lock().await;
        let started = Instant::now();
        match self.sink.replace_all(&rows).await {
            Ok(inserted) => {
                info!(
                    inserted,
                    model = model_identifier,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "forecast published"
                );
                Ok(inserted)
            }
            Err(e) => {
                error!(error = %e, rows = rows.len(), "forecast publish rolled back");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::MemoryStore;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn rows(n: u32, q: f64) -> Vec<ForecastRow> {
        (1..=n)
            .map(|d| ForecastRow {
                forecast_date: NaiveDate::from_ymd_opt(2025, 7, d).unwrap(),
                category: "Rice".to_string(),
                region: "Dhaka".to_string(),
                predicted_quantity: q,
                model_identifier: String::new(),
            })
            .collect()
    }

    /// Records the peak number of overlapping replaces.
    #[derive(Default)]
    struct TrackingSink {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        inner: MemoryStore,
    }

    #[async_trait]
    impl ForecastSink for TrackingSink {
        async fn replace_all(&self, rows: &[ForecastRow]) -> Result<u64, StoreError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            let result = self.inner.replace_all(rows).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            result
        }

        async fn current(&self) -> Result<Vec<ForecastRow>, StoreError> {
            self.inner.current().await
        }

        async fn count(&self) -> Result<u64, StoreError> {
            self.inner.count().await
        }
    }

    #[tokio::test]
    async fn test_publish_tags_rows_with_model() {
        let store = Arc::new(MemoryStore::new());
        let publisher = ForecastPublisher::new(store.clone());

        let inserted = publisher.publish(rows(3, 5.0), "best_5_models_v1").await.unwrap();
        assert_eq!(inserted, 3);
        let published = store.current().await.unwrap();
        assert!(published.iter().all(|r| r.model_identifier == "best_5_models_v1"));
    }

    #[tokio::test]
    async fn test_failed_publish_leaves_previous_forecast() {
        let store = Arc::new(MemoryStore::new());
        let publisher = ForecastPublisher::new(store.clone());
        publisher.publish(rows(2, 1.0), "old").await.unwrap();
        let before = store.current().await.unwrap();

        store.fail_next_replace(1);
        assert!(publisher.publish(rows(5, 9.0), "new").await.is_err());
        assert_eq!(store.current().await.unwrap(), before);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_publishes_are_serialized() {
        let sink = Arc::new(TrackingSink::default());
        let publisher = Arc::new(ForecastPublisher::new(sink.clone()));

        let mut handles = Vec::new();
        for i in 0..4 {
            let publisher = publisher.clone();
            handles.push(tokio::spawn(async move {
                publisher.publish(rows(3 + i, i as f64), &format!("m{i}")).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(sink.peak.load(Ordering::SeqCst), 1);
        // the survivor is one complete set, never a mix
        let published = sink.current().await.unwrap();
        let model = &published[0].model_identifier;
        assert!(published.iter().all(|r| &r.model_identifier == model));
        assert_eq!(published.len() as u64, 3 + model[1..].parse::<u64>().unwrap());
    }
}

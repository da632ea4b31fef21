use std::sync::Arc;

use chrono::Duration;
use tracing::{debug, instrument};

use crate::fingerprint::ReporterFingerprint;
use crate::observation::PriceObservation;
use crate::report::NormalizedReport;
use crate::store::{ObservationStore, StoreResult};
use crate::time::TimeSource;

/// How long a persisted price stays current for deduplication, in seconds.
pub const DEFAULT_LOOKBACK_WINDOW_SECS: i64 = 8 * 60 * 60;

pub fn default_lookback_window() -> Duration {
    Duration::seconds(DEFAULT_LOOKBACK_WINDOW_SECS)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupOutcome {
    /// A new observation was appended.
    Persisted,
    /// The current price in the lookback window is the same, nothing was written.
    Unchanged,
    /// The client asked for this report to be ignored with a negative price.
    Skipped,
}

impl DedupOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DedupOutcome::Persisted => "persisted",
            DedupOutcome::Unchanged => "unchanged",
            DedupOutcome::Skipped => "skipped",
        }
    }
}

/// Decides, for one (store, item) pair, whether a report carries a price change
/// worth persisting.
///
/// The lookup and the insert are not isolated from each other: two identical
/// reports processed at the same time can both miss the lookback and both be
/// persisted. That duplicate is accepted, nothing here locks the store.
#[derive(Clone)]
pub struct DedupEngine {
    store: Arc<dyn ObservationStore + Send + Sync>,
    timesource: Arc<dyn TimeSource + Send + Sync>,
    lookback: Duration,
}

impl DedupEngine {
    pub fn new(
        store: Arc<dyn ObservationStore + Send + Sync>,
        timesource: Arc<dyn TimeSource + Send + Sync>,
        lookback: Duration,
    ) -> Self {
        Self {
            store,
            timesource,
            lookback,
        }
    }

    pub fn lookback(&self) -> Duration {
        self.lookback
    }

    #[instrument(skip_all, fields(sku_id = %report.sku_id, store_id = %report.store_id))]
    pub async fn decide(
        &self,
        report: &NormalizedReport,
        reporter: &ReporterFingerprint,
    ) -> StoreResult<DedupOutcome> {
        if report.is_skip() {
            return Ok(DedupOutcome::Skipped);
        }

        let since = self.timesource.current_time() - self.lookback;
        let previous = self
            .store
            .latest_since(&report.sku_id, &report.store_id, since)
            .await?;

        if let Some(previous) = previous {
            // Exact comparison, any difference in price is a change.
            if previous.price == report.price {
                debug!(price = report.price, "price unchanged within lookback window");
                return Ok(DedupOutcome::Unchanged);
            }
        }

        let observation =
            PriceObservation::new(report, reporter.clone(), self.timesource.current_time());
        self.store.insert(&observation).await?;

        Ok(DedupOutcome::Persisted)
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};

    use super::*;
    use crate::fingerprint::Fingerprinter;
    use crate::observation::{ObservationFilter, PublicObservation};
    use crate::store::memory::MemoryObservationStore;
    use crate::store::StoreError;
    use crate::time::FixedTime;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 10, 18, 12, 0, 0).unwrap()
    }

    fn report(price: f64) -> NormalizedReport {
        NormalizedReport {
            sku_id: "ABC123".to_owned(),
            store_id: "S1".to_owned(),
            name: Some("Milk".to_owned()),
            price,
        }
    }

    fn reporter() -> ReporterFingerprint {
        Fingerprinter::new(Some("salt".to_owned())).fingerprint("203.0.113.7")
    }

    fn engine(store: &MemoryObservationStore) -> DedupEngine {
        DedupEngine::new(
            Arc::new(store.clone()),
            Arc::new(FixedTime { time: now() }),
            default_lookback_window(),
        )
    }

    async fn seed(store: &MemoryObservationStore, price: f64, age: Duration) {
        let observation = PriceObservation::new(&report(price), reporter(), now() - age);
        store.insert(&observation).await.unwrap();
    }

    #[tokio::test]
    async fn persists_without_history() {
        let store = MemoryObservationStore::new();

        let outcome = engine(&store).decide(&report(4.99), &reporter()).await.unwrap();

        assert_eq!(outcome, DedupOutcome::Persisted);
        let observations = store.observations().await;
        assert_eq!(observations.len(), 1);
        assert_eq!(observations[0].price, 4.99);
        assert_eq!(observations[0].sku_id, "ABC123");
        assert_eq!(observations[0].store_id, "S1");
        assert_eq!(observations[0].name.as_deref(), Some("Milk"));
        assert_eq!(observations[0].reporter, reporter());
        assert_eq!(observations[0].created_at, now());
    }

    #[tokio::test]
    async fn same_price_within_window_is_unchanged() {
        let store = MemoryObservationStore::new();
        seed(&store, 4.99, Duration::hours(1)).await;

        let outcome = engine(&store).decide(&report(4.99), &reporter()).await.unwrap();

        assert_eq!(outcome, DedupOutcome::Unchanged);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn different_price_within_window_is_persisted() {
        let store = MemoryObservationStore::new();
        seed(&store, 4.99, Duration::hours(1)).await;

        let outcome = engine(&store).decide(&report(5.49), &reporter()).await.unwrap();

        assert_eq!(outcome, DedupOutcome::Persisted);
        let observations = store.observations().await;
        assert_eq!(observations.len(), 2);
        assert_eq!(observations[1].price, 5.49);
    }

    #[tokio::test]
    async fn compares_against_most_recent_only() {
        let store = MemoryObservationStore::new();
        seed(&store, 4.99, Duration::hours(3)).await;
        seed(&store, 5.49, Duration::hours(1)).await;

        let outcome = engine(&store).decide(&report(4.99), &reporter()).await.unwrap();

        assert_eq!(outcome, DedupOutcome::Persisted);
    }

    #[tokio::test]
    async fn history_outside_window_is_ignored() {
        let store = MemoryObservationStore::new();
        seed(&store, 4.99, Duration::hours(9)).await;

        let outcome = engine(&store).decide(&report(4.99), &reporter()).await.unwrap();

        // The stale entry is invisible, the same price is written again.
        assert_eq!(outcome, DedupOutcome::Persisted);
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn window_is_configurable() {
        let store = MemoryObservationStore::new();
        seed(&store, 4.99, Duration::hours(9)).await;

        let engine = DedupEngine::new(
            Arc::new(store.clone()),
            Arc::new(FixedTime { time: now() }),
            Duration::hours(12),
        );

        assert_eq!(engine.lookback(), Duration::hours(12));
        assert_eq!(
            engine.decide(&report(4.99), &reporter()).await.unwrap(),
            DedupOutcome::Unchanged
        );
    }

    /// Fails every call, to prove skipped reports never reach the store.
    struct UnavailableStore;

    #[async_trait]
    impl ObservationStore for UnavailableStore {
        async fn insert(&self, _: &PriceObservation) -> StoreResult<()> {
            Err(StoreError::Unavailable("insert".to_owned()))
        }

        async fn latest_since(
            &self,
            _: &str,
            _: &str,
            _: DateTime<Utc>,
        ) -> StoreResult<Option<PriceObservation>> {
            Err(StoreError::Unavailable("latest_since".to_owned()))
        }

        async fn reporter_exists(&self, _: &ReporterFingerprint) -> StoreResult<bool> {
            Err(StoreError::Unavailable("reporter_exists".to_owned()))
        }

        async fn page(&self, _: &ObservationFilter) -> StoreResult<Vec<PublicObservation>> {
            Err(StoreError::Unavailable("page".to_owned()))
        }
    }

    #[tokio::test]
    async fn negative_price_never_touches_store() {
        let engine = DedupEngine::new(
            Arc::new(UnavailableStore),
            Arc::new(FixedTime { time: now() }),
            default_lookback_window(),
        );

        assert_eq!(
            engine.decide(&report(-1.0), &reporter()).await.unwrap(),
            DedupOutcome::Skipped
        );
        assert!(matches!(
            engine.decide(&report(1.0), &reporter()).await,
            Err(StoreError::Unavailable(_))
        ));
    }
}

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{ObservationStore, StoreResult};
use crate::fingerprint::ReporterFingerprint;
use crate::observation::{ObservationFilter, PriceObservation, PublicObservation};

/// Keeps observations in process memory. For local runs without Postgres, and tests.
#[derive(Clone, Default)]
pub struct MemoryObservationStore {
    observations: Arc<RwLock<Vec<PriceObservation>>>,
}

impl MemoryObservationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.observations.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.observations.read().await.is_empty()
    }

    pub async fn observations(&self) -> Vec<PriceObservation> {
        self.observations.read().await.clone()
    }
}

#[async_trait]
impl ObservationStore for MemoryObservationStore {
    async fn insert(&self, observation: &PriceObservation) -> StoreResult<()> {
        self.observations.write().await.push(observation.clone());
        Ok(())
    }

    async fn latest_since(
        &self,
        sku_id: &str,
        store_id: &str,
        since: DateTime<Utc>,
    ) -> StoreResult<Option<PriceObservation>> {
        let observations = self.observations.read().await;
        Ok(observations
            .iter()
            .filter(|o| o.sku_id == sku_id && o.store_id == store_id && o.created_at >= since)
            .max_by_key(|o| o.created_at)
            .cloned())
    }

    async fn reporter_exists(&self, reporter: &ReporterFingerprint) -> StoreResult<bool> {
        let observations = self.observations.read().await;
        Ok(observations.iter().any(|o| &o.reporter == reporter))
    }

    async fn page(&self, filter: &ObservationFilter) -> StoreResult<Vec<PublicObservation>> {
        let observations = self.observations.read().await;
        let mut matching: Vec<&PriceObservation> =
            observations.iter().filter(|o| filter.matches(o)).collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        // Offsets are bounded by MAX_PAGE * PAGE_SIZE, they always fit a usize.
        let offset = usize::try_from(filter.offset()).unwrap_or(usize::MAX);
        let limit = usize::try_from(filter.limit()).unwrap_or(usize::MAX);

        Ok(matching
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(PriceObservation::to_public)
            .collect())
    }
}

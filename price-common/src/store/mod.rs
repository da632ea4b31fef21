//! The observation store is the only shared mutable state of the service. The
//! core appends to it and reads from it, it never updates or deletes.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::fingerprint::ReporterFingerprint;
use crate::observation::{ObservationFilter, PriceObservation, PublicObservation};

pub mod memory;
pub mod postgres;

/// Enumeration of errors for operations with an `ObservationStore`.
/// Errors can originate from sqlx and are wrapped by us to provide additional context.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("connection failed with: {error}")]
    ConnectionError { error: sqlx::Error },
    #[error("{command} query failed with: {error}")]
    QueryError { command: String, error: sqlx::Error },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[async_trait]
pub trait ObservationStore {
    /// Appends a new observation.
    async fn insert(&self, observation: &PriceObservation) -> StoreResult<()>;

    /// The most recent observation of `sku_id` at `store_id` created at or after `since`.
    async fn latest_since(
        &self,
        sku_id: &str,
        store_id: &str,
        since: DateTime<Utc>,
    ) -> StoreResult<Option<PriceObservation>>;

    /// Whether this reporter has ever submitted an observation that was persisted.
    async fn reporter_exists(&self, reporter: &ReporterFingerprint) -> StoreResult<bool>;

    /// One page of observations matching `filter`, newest first.
    async fn page(&self, filter: &ObservationFilter) -> StoreResult<Vec<PublicObservation>>;
}

/// Lets callers keep a handle on a store they hand over.
#[async_trait]
impl<T> ObservationStore for Arc<T>
where
    T: ObservationStore + Send + Sync + ?Sized,
{
    async fn insert(&self, observation: &PriceObservation) -> StoreResult<()> {
        (**self).insert(observation).await
    }

    async fn latest_since(
        &self,
        sku_id: &str,
        store_id: &str,
        since: DateTime<Utc>,
    ) -> StoreResult<Option<PriceObservation>> {
        (**self).latest_since(sku_id, store_id, since).await
    }

    async fn reporter_exists(&self, reporter: &ReporterFingerprint) -> StoreResult<bool> {
        (**self).reporter_exists(reporter).await
    }

    async fn page(&self, filter: &ObservationFilter) -> StoreResult<Vec<PublicObservation>> {
        (**self).page(filter).await
    }
}

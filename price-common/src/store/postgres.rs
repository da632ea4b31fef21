use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};

use super::{ObservationStore, StoreError, StoreResult};
use crate::fingerprint::ReporterFingerprint;
use crate::observation::{ObservationFilter, PriceObservation, PublicObservation};

/// An observation store backed by the `price_observations` table in PostgreSQL.
#[derive(Clone)]
pub struct PgObservationStore {
    pool: PgPool,
}

impl PgObservationStore {
    /// Connect a new pool. Store calls fail instead of queueing forever when the pool
    /// can't hand out a connection within `acquire_timeout`.
    pub async fn new(
        url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(url)
            .await
            .map_err(|error| StoreError::ConnectionError { error })?;

        Ok(Self { pool })
    }

    pub fn new_from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl ObservationStore for PgObservationStore {
    async fn insert(&self, observation: &PriceObservation) -> StoreResult<()> {
        sqlx::query(
            r#"
INSERT INTO price_observations
    (id, name, sku_id, store_id, price, reporter, created_at)
VALUES
    ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(observation.id)
        .bind(&observation.name)
        .bind(&observation.sku_id)
        .bind(&observation.store_id)
        .bind(observation.price)
        .bind(&observation.reporter)
        .bind(observation.created_at)
        .execute(&self.pool)
        .await
        .map_err(|error| StoreError::QueryError {
            command: "INSERT".to_owned(),
            error,
        })?;

        Ok(())
    }

    async fn latest_since(
        &self,
        sku_id: &str,
        store_id: &str,
        since: DateTime<Utc>,
    ) -> StoreResult<Option<PriceObservation>> {
        sqlx::query_as::<_, PriceObservation>(
            r#"
SELECT
    id, name, sku_id, store_id, price, reporter, created_at
FROM
    price_observations
WHERE
    sku_id = $1
    AND store_id = $2
    AND created_at >= $3
ORDER BY
    created_at DESC
LIMIT 1
            "#,
        )
        .bind(sku_id)
        .bind(store_id)
        .bind(since)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| StoreError::QueryError {
            command: "SELECT".to_owned(),
            error,
        })
    }

    async fn reporter_exists(&self, reporter: &ReporterFingerprint) -> StoreResult<bool> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM price_observations WHERE reporter = $1)",
        )
        .bind(reporter)
        .fetch_one(&self.pool)
        .await
        .map_err(|error| StoreError::QueryError {
            command: "SELECT".to_owned(),
            error,
        })
    }

    async fn page(&self, filter: &ObservationFilter) -> StoreResult<Vec<PublicObservation>> {
        sqlx::query_as::<_, PublicObservation>(
            r#"
SELECT
    name, sku_id, store_id, price, created_at
FROM
    price_observations
WHERE
    store_id = $1
    AND ($2::text[] IS NULL OR sku_id = ANY($2))
ORDER BY
    created_at DESC
OFFSET $3
LIMIT $4
            "#,
        )
        .bind(filter.store_id())
        .bind(filter.item_ids().map(<[String]>::to_vec))
        .bind(filter.offset())
        .bind(filter.limit())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| StoreError::QueryError {
            command: "SELECT".to_owned(),
            error,
        })
    }
}

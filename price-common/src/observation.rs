use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::fingerprint::ReporterFingerprint;
use crate::report::{
    normalize_id, FieldError, NormalizedReport, ReportError, SKU_ID_MAX_LEN, STORE_ID_MAX_LEN,
};

/// Rows returned per page of a read query.
pub const PAGE_SIZE: u32 = 10_000;
/// Highest page number a reader may ask for.
pub const MAX_PAGE: u32 = 150;

/// A persisted price observation. Observations are only ever appended, never
/// updated. Not serializable on purpose: readers get a `PublicObservation`.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct PriceObservation {
    pub id: Uuid,
    pub name: Option<String>,
    pub sku_id: String,
    pub store_id: String,
    pub price: f64,
    pub reporter: ReporterFingerprint,
    pub created_at: DateTime<Utc>,
}

impl PriceObservation {
    pub fn new(
        report: &NormalizedReport,
        reporter: ReporterFingerprint,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            name: report.name.clone(),
            sku_id: report.sku_id.clone(),
            store_id: report.store_id.clone(),
            price: report.price,
            reporter,
            created_at,
        }
    }

    pub fn to_public(&self) -> PublicObservation {
        PublicObservation {
            name: self.name.clone(),
            sku_id: self.sku_id.clone(),
            store_id: self.store_id.clone(),
            price: self.price,
            created_at: self.created_at,
        }
    }
}

/// What readers see of an observation: no internal id, no reporter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PublicObservation {
    pub name: Option<String>,
    pub sku_id: String,
    pub store_id: String,
    pub price: f64,
    pub created_at: DateTime<Utc>,
}

/// A validated, bounded read query: one store, optionally a set of items, one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservationFilter {
    store_id: String,
    item_ids: Option<Vec<String>>,
    page: u32,
}

impl ObservationFilter {
    /// Identifiers go through the same normalization as ingestion so that reads
    /// match what was stored.
    pub fn new(
        store_id: Option<&str>,
        item_ids: Option<Vec<String>>,
        page: u32,
    ) -> Result<Self, ReportError> {
        let mut errors = Vec::new();

        let store_id = store_id
            .map(|store_id| normalize_id(store_id, STORE_ID_MAX_LEN))
            .unwrap_or_default();
        if store_id.is_empty() {
            errors.push(FieldError::new("storeId", "is required"));
        }

        let item_ids = item_ids.map(|item_ids| {
            item_ids
                .iter()
                .enumerate()
                .filter_map(|(index, item_id)| {
                    let normalized = normalize_id(item_id, SKU_ID_MAX_LEN);
                    if normalized.is_empty() {
                        errors.push(FieldError::new(format!("itemIds[{index}]"), "is required"));
                        None
                    } else {
                        Some(normalized)
                    }
                })
                .collect::<Vec<_>>()
        });

        if page > MAX_PAGE {
            errors.push(FieldError::new(
                "page",
                format!("must be less than or equal to {MAX_PAGE}"),
            ));
        }

        if !errors.is_empty() {
            return Err(ReportError::Validation(errors));
        }

        Ok(Self {
            store_id,
            item_ids,
            page,
        })
    }

    pub fn store_id(&self) -> &str {
        &self.store_id
    }

    pub fn item_ids(&self) -> Option<&[String]> {
        self.item_ids.as_deref()
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page) * i64::from(PAGE_SIZE)
    }

    pub fn limit(&self) -> i64 {
        i64::from(PAGE_SIZE)
    }

    pub fn matches(&self, observation: &PriceObservation) -> bool {
        observation.store_id == self.store_id
            && self
                .item_ids
                .as_ref()
                .map_or(true, |item_ids| item_ids.contains(&observation.sku_id))
    }
}

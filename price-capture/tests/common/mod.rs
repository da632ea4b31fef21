#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use chrono::{DateTime, Utc};
use http_body_util::BodyExt;
use serde_json::Value;
use tokio::sync::{mpsc, Barrier};
use tower::ServiceExt;

use price_capture::router::{router, State};
use price_common::contributors::ContributorAnnouncer;
use price_common::dedup::default_lookback_window;
use price_common::fingerprint::{Fingerprinter, ReporterFingerprint};
use price_common::geo::{EnrichmentError, NoopLocationResolver};
use price_common::notify::{Notification, NotificationSink};
use price_common::observation::{ObservationFilter, PriceObservation, PublicObservation};
use price_common::store::{ObservationStore, StoreError, StoreResult};
use price_common::time::SystemTime;

pub const MAX_BODY_SIZE: usize = 100_000;
pub const SALT: &str = "integration-salt";

/// Forwards notifications to the test through a channel.
pub struct ChannelSink {
    sender: mpsc::UnboundedSender<Notification>,
}

#[async_trait]
impl NotificationSink for ChannelSink {
    async fn notify(&self, notification: Notification) -> Result<(), EnrichmentError> {
        self.sender
            .send(notification)
            .map_err(|_| EnrichmentError::NotConfigured)
    }
}

pub fn app<S: ObservationStore + Send + Sync + 'static>(
    store: S,
) -> (Router, mpsc::UnboundedReceiver<Notification>) {
    app_with_metrics(store, false)
}

pub fn app_with_metrics<S: ObservationStore + Send + Sync + 'static>(
    store: S,
    metrics: bool,
) -> (Router, mpsc::UnboundedReceiver<Notification>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    let announcer = ContributorAnnouncer::new(
        Arc::new(NoopLocationResolver),
        Arc::new(ChannelSink { sender }),
    );
    let state = State::new(
        SystemTime {},
        store,
        Fingerprinter::new(Some(SALT.to_owned())),
        announcer,
        default_lookback_window(),
    );

    (router(state, MAX_BODY_SIZE, 10, metrics), receiver)
}

pub fn reporter(address: &str) -> ReporterFingerprint {
    Fingerprinter::new(Some(SALT.to_owned())).fingerprint(address)
}

pub async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Option<Value>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    if body.is_empty() {
        (status, None)
    } else {
        (status, Some(serde_json::from_slice(&body).unwrap()))
    }
}

pub fn post_reports(body: impl Into<Body>, forwarded_for: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/reports")
        .header("content-type", "application/json")
        .header("x-forwarded-for", forwarded_for)
        .body(body.into())
        .unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

/// Counts every call before handing it to the wrapped store.
#[derive(Default)]
pub struct CountingStore<S> {
    pub inner: S,
    pub inserts: AtomicUsize,
    pub lookups: AtomicUsize,
    pub reporter_checks: AtomicUsize,
    pub pages: AtomicUsize,
}

impl<S> CountingStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            inserts: AtomicUsize::new(0),
            lookups: AtomicUsize::new(0),
            reporter_checks: AtomicUsize::new(0),
            pages: AtomicUsize::new(0),
        }
    }

    pub fn total(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
            + self.lookups.load(Ordering::SeqCst)
            + self.reporter_checks.load(Ordering::SeqCst)
            + self.pages.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<S: ObservationStore + Send + Sync> ObservationStore for CountingStore<S> {
    async fn insert(&self, observation: &PriceObservation) -> StoreResult<()> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        self.inner.insert(observation).await
    }

    async fn latest_since(
        &self,
        sku_id: &str,
        store_id: &str,
        since: DateTime<Utc>,
    ) -> StoreResult<Option<PriceObservation>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.inner.latest_since(sku_id, store_id, since).await
    }

    async fn reporter_exists(&self, reporter: &ReporterFingerprint) -> StoreResult<bool> {
        self.reporter_checks.fetch_add(1, Ordering::SeqCst);
        self.inner.reporter_exists(reporter).await
    }

    async fn page(&self, filter: &ObservationFilter) -> StoreResult<Vec<PublicObservation>> {
        self.pages.fetch_add(1, Ordering::SeqCst);
        self.inner.page(filter).await
    }
}

/// Holds every lookup at the barrier, so that concurrent submissions all read
/// before any of them writes.
pub struct GatedStore<S> {
    pub inner: S,
    pub barrier: Barrier,
}

#[async_trait]
impl<S: ObservationStore + Send + Sync> ObservationStore for GatedStore<S> {
    async fn insert(&self, observation: &PriceObservation) -> StoreResult<()> {
        self.inner.insert(observation).await
    }

    async fn latest_since(
        &self,
        sku_id: &str,
        store_id: &str,
        since: DateTime<Utc>,
    ) -> StoreResult<Option<PriceObservation>> {
        let latest = self.inner.latest_since(sku_id, store_id, since).await;
        self.barrier.wait().await;
        latest
    }

    async fn reporter_exists(&self, reporter: &ReporterFingerprint) -> StoreResult<bool> {
        self.inner.reporter_exists(reporter).await
    }

    async fn page(&self, filter: &ObservationFilter) -> StoreResult<Vec<PublicObservation>> {
        self.inner.page(filter).await
    }
}

/// A store whose backend is down.
pub struct UnavailableStore;

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

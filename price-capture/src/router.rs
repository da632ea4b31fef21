use std::any::Any;
use std::convert::Infallible;
use std::future::ready;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use price_common::batch::BatchCoordinator;
use price_common::contributors::ContributorAnnouncer;
use price_common::dedup::DedupEngine;
use price_common::fingerprint::Fingerprinter;
use price_common::metrics::{setup_metrics_recorder, track_metrics};
use price_common::store::ObservationStore;
use price_common::time::TimeSource;

use crate::api::ApiError;
use crate::handlers;

#[derive(Clone)]
pub struct State {
    pub store: Arc<dyn ObservationStore + Send + Sync>,
    pub coordinator: BatchCoordinator,
    pub fingerprinter: Fingerprinter,
    pub announcer: ContributorAnnouncer,
}

impl State {
    pub fn new<
        TZ: TimeSource + Send + Sync + 'static,
        S: ObservationStore + Send + Sync + 'static,
    >(
        timesource: TZ,
        store: S,
        fingerprinter: Fingerprinter,
        announcer: ContributorAnnouncer,
        lookback: chrono::Duration,
    ) -> Self {
        let store: Arc<dyn ObservationStore + Send + Sync> = Arc::new(store);
        let dedup = DedupEngine::new(store.clone(), Arc::new(timesource), lookback);

        Self {
            coordinator: BatchCoordinator::new(store.clone(), dedup),
            store,
            fingerprinter,
            announcer,
        }
    }
}

fn handle_panic(_: Box<dyn Any + Send + 'static>) -> Response {
    error!("request handler panicked");
    ApiError::Unknown.into_response()
}

pub fn router(
    state: State,
    max_body_size: usize,
    concurrency_limit: usize,
    metrics: bool,
) -> Router {
    let reports = post(handlers::post_reports)
        .layer::<_, Infallible>(ConcurrencyLimitLayer::new(concurrency_limit))
        .layer::<_, Infallible>(DefaultBodyLimit::max(max_body_size))
        .get(handlers::get_reports)
        .fallback(handlers::no_content);

    let router = Router::new()
        .route("/reports", reports)
        .route("/ping", get(handlers::ping).fallback(handlers::no_content))
        .fallback(handlers::no_content)
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(track_metrics))
        .layer(CatchPanicLayer::custom(handle_panic))
        .with_state(state);

    // Don't install metrics unless asked to
    // Installing a global recorder when this is used as a library (during tests etc)
    // does not work well.
    if !metrics {
        return router;
    }

    match setup_metrics_recorder() {
        Ok(recorder_handle) => {
            router.route(
            "/metrics",
            get(move || ready(recorder_handle.render())).fallback(handlers::no_content),
        )
        }
        Err(err) => {
            warn!("failed to install prometheus recorder, not exposing /metrics: {}", err);
            router
        }
    }
}

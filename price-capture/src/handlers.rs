use axum::extract::{RawQuery, State};
use axum::http::StatusCode;
use axum::Json;
use bytes::Bytes;
use serde_json::Value;
use tracing::{debug, error, instrument, Span};

use price_common::metrics::report_rejected_reports;
use price_common::observation::PublicObservation;
use price_common::report::normalize_batch;

use crate::api::{ApiError, ApiResponse};
use crate::extractors::ClientAddress;
use crate::query::parse_report_query;
use crate::router;

#[instrument(
    skip_all,
    fields(
        batch_size,
        persisted,
        new_contributor,
    )
)]
pub async fn post_reports(
    state: State<router::State>,
    ClientAddress(address): ClientAddress,
    body: Bytes,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    let body: Value = serde_json::from_slice(&body).map_err(|err| {
        report_rejected_reports("malformed_body", 1);
        ApiError::from(err)
    })?;

    let batch = normalize_batch(body).map_err(|err| {
        report_rejected_reports("invalid_batch", 1);
        ApiError::from(err)
    })?;
    Span::current().record("batch_size", batch.len());

    let reporter = state.fingerprinter.fingerprint(&address);
    let outcome = state.coordinator.process(&batch, &reporter).await;
    Span::current().record("persisted", outcome.persisted);
    Span::current().record("new_contributor", outcome.new_contributor);
    debug!(?outcome, "processed price reports");

    let response = Json(ApiResponse::ok());

    if outcome.new_contributor {
        drop(state.announcer.announce(address, outcome.accepted));
    }

    Ok(response)
}

#[instrument(skip_all, fields(store_id))]
pub async fn get_reports(
    state: State<router::State>,
    RawQuery(query): RawQuery,
) -> Result<Json<ApiResponse<Vec<PublicObservation>>>, ApiError> {
    let filter = parse_report_query(query.as_deref())?;
    Span::current().record("store_id", filter.store_id());

    let observations = state.store.page(&filter).await.map_err(|err| {
        error!("failed to read price observations: {}", err);
        ApiError::from(err)
    })?;

    Ok(Json(ApiResponse::with_data(observations)))
}

pub async fn ping() -> Json<ApiResponse<()>> {
    Json(ApiResponse::message("Pong!"))
}

/// Everything the service doesn't know about gets an empty 204.
pub async fn no_content() -> StatusCode {
    StatusCode::NO_CONTENT
}

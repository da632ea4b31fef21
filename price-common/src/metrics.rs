use std::time::Instant;

use axum::{body::Body, extract::MatchedPath, http::Request, middleware::Next, response::IntoResponse};
use metrics::counter;
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};

pub const REPORTS_RECEIVED: &str = "price_reports_received_total";
pub const REPORTS_REJECTED: &str = "price_reports_rejected_total";
pub const DEDUP_OUTCOMES: &str = "price_dedup_outcomes_total";
pub const BATCH_SIZE: &str = "price_batch_size";
pub const NEW_CONTRIBUTORS: &str = "price_new_contributors_total";
pub const NOTIFICATIONS: &str = "price_notifications_total";

/// Counts requests turned away before any report was processed.
pub fn report_rejected_reports(cause: &'static str, quantity: u64) {
    counter!(REPORTS_REJECTED, "cause" => cause).increment(quantity);
}

pub fn setup_metrics_recorder() -> Result<PrometheusHandle, BuildError> {
    const EXPONENTIAL_SECONDS: &[f64] = &[
        0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
    ];
    const BATCH_SIZES: &[f64] = &[1.0, 5.0, 10.0, 25.0, 50.0, 75.0, 100.0];

    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("http_requests_duration_seconds".to_string()),
            EXPONENTIAL_SECONDS,
        )?
        .set_buckets_for_metric(Matcher::Full(BATCH_SIZE.to_string()), BATCH_SIZES)?
        .install_recorder()
}

/// Records request count and latency by method, route and status.
pub async fn track_metrics(req: Request<Body>, next: Next) -> impl IntoResponse {
    let start = Instant::now();

    // Unmatched paths all land on the fallback, don't let them blow up label cardinality.
    let path = if let Some(matched_path) = req.extensions().get::<MatchedPath>() {
        matched_path.as_str().to_owned()
    } else {
        "unmatched".to_owned()
    };

    let method = req.method().clone();

    let response = next.run(req).await;

    let latency = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    let labels = [
        ("method", method.to_string()),
        ("path", path),
        ("status", status),
    ];

    metrics::counter!("http_requests_total", &labels).increment(1);
    metrics::histogram!("http_requests_duration_seconds", &labels).record(latency);

    response
}

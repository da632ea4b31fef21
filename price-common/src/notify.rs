use std::time::Duration;

use async_trait::async_trait;
use reqwest::header;
use serde::Serialize;
use tracing::info;

use crate::geo::{EnrichmentError, Location};

/// Builds the client shared by every outbound call: JSON by default, bounded by
/// `timeout` so a slow collaborator never holds a task forever.
pub fn build_http_client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    let mut headers = header::HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("application/json"),
    );

    reqwest::Client::builder()
        .default_headers(headers)
        .user_agent("Price Capture")
        .timeout(timeout)
        .build()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub content: String,
    pub report_count: usize,
    pub location: Option<String>,
}

impl Notification {
    pub fn new_contributor(report_count: usize, location: Option<&Location>) -> Self {
        let content = match location {
            Some(location) => format!(
                "New contributor submitted {} price reports from {}",
                report_count, location
            ),
            None => format!("New contributor submitted {} price reports", report_count),
        };

        Self {
            content,
            report_count,
            location: location.map(ToString::to_string),
        }
    }
}

#[async_trait]
pub trait NotificationSink {
    async fn notify(&self, notification: Notification) -> Result<(), EnrichmentError>;
}

/// Posts notifications as JSON to a webhook.
#[derive(Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(client: reqwest::Client, url: &str) -> Self {
        Self {
            client,
            url: url.to_owned(),
        }
    }
}

#[async_trait]
impl NotificationSink for WebhookNotifier {
    async fn notify(&self, notification: Notification) -> Result<(), EnrichmentError> {
        let response = self
            .client
            .post(&self.url)
            .json(&notification)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(EnrichmentError::Status(status));
        }

        Ok(())
    }
}

/// Writes notifications to the log, for when no webhook is configured.
#[derive(Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl NotificationSink for LogNotifier {
    async fn notify(&self, notification: Notification) -> Result<(), EnrichmentError> {
        info!(report_count = notification.report_count, "{}", notification.content);
        Ok(())
    }
}

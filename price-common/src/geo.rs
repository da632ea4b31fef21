use std::fmt;
use std::net::IpAddr;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

/// Errors raised while enriching or announcing a new contributor. None of them
/// ever reach the client that submitted the batch.
#[derive(Error, Debug)]
pub enum EnrichmentError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("unexpected response status: {0}")]
    Status(StatusCode),
    #[error("location not found: {0}")]
    NotFound(String),
    #[error("not configured")]
    NotConfigured,
}

/// A coarse, human readable location. Parts the resolver didn't know are absent.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Location {
    pub city: Option<String>,
    pub region: Option<String>,
    pub country: Option<String>,
}

impl Location {
    pub fn is_empty(&self) -> bool {
        self.city.is_none() && self.region.is_none() && self.country.is_none()
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<&str> = [&self.city, &self.region, &self.country]
            .into_iter()
            .filter_map(|part| part.as_deref())
            .collect();
        write!(f, "{}", parts.join(", "))
    }
}

#[async_trait]
pub trait LocationResolver {
    async fn locate(&self, address: &str) -> Result<Location, EnrichmentError>;
}

/// Body of an ip lookup service response. Both `regionName` and `region` are
/// accepted, some services send the two with `region` holding a code.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupResponse {
    status: Option<String>,
    message: Option<String>,
    city: Option<String>,
    region_name: Option<String>,
    region: Option<String>,
    country: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

/// Resolves addresses with `GET {base_url}/{address}` against a JSON lookup service.
#[derive(Clone)]
pub struct HttpLocationResolver {
    client: reqwest::Client,
    base_url: String,
}

impl HttpLocationResolver {
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
        }
    }
}

#[async_trait]
impl LocationResolver for HttpLocationResolver {
    async fn locate(&self, address: &str) -> Result<Location, EnrichmentError> {
        if address.is_empty() {
            return Err(EnrichmentError::NotFound("no client address".to_owned()));
        }

        // The address may come straight from a forwarded header, only ever put an ip in the path.
        let ip: IpAddr = address
            .parse()
            .map_err(|_| EnrichmentError::NotFound(format!("not an ip address: {address}")))?;

        let url = format!("{}/{}", self.base_url, ip);
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(EnrichmentError::Status(status));
        }

        let body: LookupResponse = response.json().await?;
        if body.status.as_deref() == Some("fail") {
            return Err(EnrichmentError::NotFound(
                body.message.unwrap_or_else(|| "lookup failed".to_owned()),
            ));
        }

        let location = Location {
            city: non_empty(body.city),
            region: non_empty(body.region_name).or_else(|| non_empty(body.region)),
            country: non_empty(body.country),
        };
        if location.is_empty() {
            return Err(EnrichmentError::NotFound("empty location".to_owned()));
        }

        debug!(%location, "resolved contributor location");
        Ok(location)
    }
}

/// Used when no lookup service is configured. Every lookup fails, which leads
/// to the notification without a location.
#[derive(Clone, Copy, Default)]
pub struct NoopLocationResolver;

#[async_trait]
impl LocationResolver for NoopLocationResolver {
    async fn locate(&self, _: &str) -> Result<Location, EnrichmentError> {
        Err(EnrichmentError::NotConfigured)
    }
}

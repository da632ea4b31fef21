use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use price_common::report::{FieldError, ReportError};
use price_common::store::StoreError;

/// Envelope of every JSON response: `{code, message, data?}`, `code` mirroring the
/// HTTP status.
#[derive(Debug, PartialEq, Deserialize, Serialize)]
pub struct ApiResponse<T> {
    pub code: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl ApiResponse<()> {
    pub fn ok() -> Self {
        Self::message("OK")
    }

    pub fn message(message: &str) -> Self {
        Self {
            code: StatusCode::OK.as_u16(),
            message: message.to_owned(),
            data: None,
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn with_data(data: T) -> Self {
        Self {
            code: StatusCode::OK.as_u16(),
            message: "OK".to_owned(),
            data: Some(data),
        }
    }
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("request body is not valid JSON: {0}")]
    MalformedBody(#[from] serde_json::Error),
    #[error("invalid request")]
    Validation(Vec<FieldError>),
    #[error("report version {0} is not supported")]
    UnsupportedVersion(i64),
    // Store details stay in the logs.
    #[error("price store is unavailable")]
    Store(#[from] StoreError),
    #[error("unexpected error")]
    Unknown,
}

impl From<ReportError> for ApiError {
    fn from(error: ReportError) -> Self {
        match error {
            ReportError::Validation(errors) => ApiError::Validation(errors),
            ReportError::UnsupportedVersion(version) => ApiError::UnsupportedVersion(version),
        }
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MalformedBody(_) => StatusCode::NOT_ACCEPTABLE,
            ApiError::Validation(_) | ApiError::UnsupportedVersion(_) => StatusCode::BAD_REQUEST,
            ApiError::Store(_) | ApiError::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();
        let data = match self {
            ApiError::Validation(errors) => Some(errors),
            _ => None,
        };

        (
            status,
            Json(ApiResponse {
                code: status.as_u16(),
                message,
                data,
            }),
        )
            .into_response()
    }
}

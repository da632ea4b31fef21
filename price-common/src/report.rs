//! Validation and normalization of client submitted price reports.
//!
//! Reports arrive as untyped JSON. Every field is kept as a raw `Value` until it
//! is normalized, so type problems are reported per field instead of failing the
//! whole body at deserialization time.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Maximum number of reports accepted in a single request.
pub const MAX_BATCH_SIZE: usize = 100;
pub const SKU_ID_MAX_LEN: usize = 32;
pub const STORE_ID_MAX_LEN: usize = 8;
pub const NAME_MAX_LEN: usize = 96;
/// Negative prices are a client signal to skip persistence, -1 is the floor.
pub const PRICE_MIN: f64 = -1.0;
pub const PRICE_MAX: f64 = 100_000.0;

/// A single problem found while validating a request, `field` being the path to
/// the offending value (`reports[3].price`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.field, self.message)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReportError {
    #[error("invalid request: {}", join_field_errors(.0))]
    Validation(Vec<FieldError>),
    #[error("report version {0} is not supported")]
    UnsupportedVersion(i64),
}

impl ReportError {
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        ReportError::Validation(vec![FieldError::new(field, message)])
    }
}

fn join_field_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(FieldError::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Layout of the reports sent by clients. Selects how raw fields map onto the
/// canonical report fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportVersion {
    V1,
}

impl ReportVersion {
    pub const DEFAULT: ReportVersion = ReportVersion::V1;

    pub fn from_number(version: i64) -> Result<Self, ReportError> {
        match version {
            1 => Ok(ReportVersion::V1),
            unsupported => Err(ReportError::UnsupportedVersion(unsupported)),
        }
    }

    /// Maps a report of this version onto the v1 field layout.
    pub fn remap(self, raw: RawReport) -> RawReport {
        match self {
            ReportVersion::V1 => raw,
        }
    }
}

/// A report as submitted by a client, nothing about it is trusted yet.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawReport {
    #[serde(default)]
    pub item_id: Option<Value>,
    #[serde(default)]
    pub store_id: Option<Value>,
    #[serde(default)]
    pub item_name: Option<Value>,
    #[serde(default)]
    pub price: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedReport {
    pub sku_id: String,
    pub store_id: String,
    pub name: Option<String>,
    pub price: f64,
}

impl NormalizedReport {
    /// Clients send a negative price to explicitly ask for the report to be ignored.
    pub fn is_skip(&self) -> bool {
        self.price < 0.0
    }
}

impl From<&NormalizedReport> for RawReport {
    fn from(report: &NormalizedReport) -> Self {
        RawReport {
            item_id: Some(Value::from(report.sku_id.clone())),
            store_id: Some(Value::from(report.store_id.clone())),
            item_name: report.name.clone().map(Value::from),
            price: Some(Value::from(report.price)),
        }
    }
}

/// Keeps ASCII alphanumerics only, then bounds the length.
pub fn normalize_id(value: &str, max_len: usize) -> String {
    value
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .take(max_len)
        .collect::<String>()
        .trim()
        .to_owned()
}

pub fn normalize_name(value: &str) -> String {
    value
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || c.is_whitespace())
        .take(NAME_MAX_LEN)
        .collect::<String>()
        .trim()
        .to_owned()
}

pub fn clamp_price(price: f64) -> f64 {
    // JSON can't carry NaN, but keep the bounds total anyway.
    if price.is_nan() {
        return PRICE_MIN;
    }
    price.clamp(PRICE_MIN, PRICE_MAX)
}

fn required_id(value: Option<&Value>, max_len: usize) -> Result<String, &'static str> {
    let value = value.ok_or("is required")?;
    let value = value.as_str().ok_or("must be a string")?;
    let normalized = normalize_id(value, max_len);
    if normalized.is_empty() {
        Err("is required")
    } else {
        Ok(normalized)
    }
}

fn optional_name(value: Option<&Value>) -> Result<Option<String>, &'static str> {
    match value {
        None => Ok(None),
        Some(Value::String(name)) => {
            let name = normalize_name(name);
            Ok((!name.is_empty()).then_some(name))
        }
        Some(_) => Err("must be a string"),
    }
}

fn required_price(value: Option<&Value>) -> Result<f64, &'static str> {
    let value = value.ok_or("is required")?;
    value.as_f64().map(clamp_price).ok_or("must be a number")
}

/// Validates and canonicalizes one report. `index` is its position in the batch,
/// used to build error paths.
pub fn normalize_report(raw: &RawReport, index: usize) -> Result<NormalizedReport, Vec<FieldError>> {
    let sku_id = required_id(raw.item_id.as_ref(), SKU_ID_MAX_LEN);
    let store_id = required_id(raw.store_id.as_ref(), STORE_ID_MAX_LEN);
    let name = optional_name(raw.item_name.as_ref());
    let price = required_price(raw.price.as_ref());

    match (sku_id, store_id, name, price) {
        (Ok(sku_id), Ok(store_id), Ok(name), Ok(price)) => Ok(NormalizedReport {
            sku_id,
            store_id,
            name,
            price,
        }),
        (sku_id, store_id, name, price) => {
            let path = |field: &str| format!("reports[{index}].{field}");
            let mut errors = Vec::new();
            if let Err(message) = sku_id {
                errors.push(FieldError::new(path("itemId"), message));
            }
            if let Err(message) = store_id {
                errors.push(FieldError::new(path("storeId"), message));
            }
            if let Err(message) = name {
                errors.push(FieldError::new(path("itemName"), message));
            }
            if let Err(message) = price {
                errors.push(FieldError::new(path("price"), message));
            }
            Err(errors)
        }
    }
}

/// Validates a whole `{ reports, version? }` request body.
///
/// Batch level checks (shape, size, version) run before any report is looked at,
/// and all per-report errors are collected so a client can fix them in one go.
pub fn normalize_batch(body: Value) -> Result<Vec<NormalizedReport>, ReportError> {
    let Value::Object(mut body) = body else {
        return Err(ReportError::invalid("body", "must be an object"));
    };

    let reports = match body.remove("reports") {
        Some(Value::Array(reports)) => reports,
        Some(Value::Null) | None => return Err(ReportError::invalid("reports", "is required")),
        Some(_) => return Err(ReportError::invalid("reports", "must be an array")),
    };

    if reports.len() > MAX_BATCH_SIZE {
        return Err(ReportError::invalid(
            "reports",
            format!("must contain at most {MAX_BATCH_SIZE} items"),
        ));
    }

    let version = match body.get("version") {
        None | Some(Value::Null) => ReportVersion::DEFAULT,
        Some(value) => match value.as_i64() {
            Some(version) => ReportVersion::from_number(version)?,
            None => return Err(ReportError::invalid("version", "must be an integer")),
        },
    };

    let mut normalized = Vec::with_capacity(reports.len());
    let mut errors = Vec::new();

    for (index, value) in reports.into_iter().enumerate() {
        // Structs also deserialize from arrays, only objects are reports.
        if !value.is_object() {
            errors.push(FieldError::new(format!("reports[{index}]"), "must be an object"));
            continue;
        }
        let raw = match serde_json::from_value::<RawReport>(value) {
            Ok(raw) => version.remap(raw),
            Err(_) => {
                errors.push(FieldError::new(format!("reports[{index}]"), "must be an object"));
                continue;
            }
        };
        match normalize_report(&raw, index) {
            Ok(report) => normalized.push(report),
            Err(mut report_errors) => errors.append(&mut report_errors),
        }
    }

    if errors.is_empty() {
        Ok(normalized)
    } else {
        Err(ReportError::Validation(errors))
    }
}

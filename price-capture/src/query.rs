use url::form_urlencoded;

use price_common::observation::ObservationFilter;
use price_common::report::{FieldError, ReportError};

/// Reads `storeId`, `itemIds[]` (or `itemIds`, repeated) and `page` from a raw
/// query string. Unknown keys are ignored.
pub fn parse_report_query(raw_query: Option<&str>) -> Result<ObservationFilter, ReportError> {
    let mut store_id: Option<String> = None;
    let mut item_ids: Option<Vec<String>> = None;
    let mut page: Option<String> = None;

    for (key, value) in form_urlencoded::parse(raw_query.unwrap_or_default().as_bytes()) {
        match key.as_ref() {
            "storeId" => store_id = Some(value.into_owned()),
            "itemIds[]" | "itemIds" => item_ids
                .get_or_insert_with(Vec::new)
                .push(value.into_owned()),
            "page" => page = Some(value.into_owned()),
            _ => {}
        }
    }

    let (page, page_error) = match page.as_deref().map(str::trim) {
        None | Some("") => (0, None),
        Some(raw) => match raw.parse::<u32>() {
            Ok(page) => (page, None),
            Err(_) => (
                0,
                Some(FieldError::new("page", "must be a non-negative integer")),
            ),
        },
    };

    match (ObservationFilter::new(store_id.as_deref(), item_ids, page), page_error) {
        (Ok(filter), None) => Ok(filter),
        (Ok(_), Some(error)) => Err(ReportError::Validation(vec![error])),
        (Err(ReportError::Validation(mut errors)), Some(error)) => {
            errors.push(error);
            Err(ReportError::Validation(errors))
        }
        (Err(error), _) => Err(error),
    }
}

pub mod convert;
pub mod search;
pub mod translators;
pub mod web;

use axum::http::{HeaderMap, header};

/// Request body as text, rejecting empty or non-UTF-8 input.
pub(crate) fn body_text(body: &[u8]) -> Result<&str, crate::error::ApiError> {
    let text = std::str::from_utf8(body)
        .map_err(|_| crate::error::ApiError::bad_request("request body is not valid UTF-8"))?
        .trim();
    if text.is_empty() {
        return Err(crate::error::ApiError::bad_request("request body is empty"));
    }
    Ok(text)
}

pub(crate) fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"))
}

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use scrivener_core::{CancellationToken, WebOutcome};

use crate::error::ApiError;
use crate::handlers::{body_text, is_json};
use crate::models::{SelectRequest, SelectionResponse};
use crate::state::AppState;

/// `POST /web`: a plain-text URL starts a translation; a JSON
/// `{token, items}` body completes a parked selection.
pub async fn web(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    // Dropped with the handler future when the client goes away.
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let text = body_text(&body)?;
    if is_json(&headers) || text.starts_with('{') {
        let request: SelectRequest = serde_json::from_str(text)
            .map_err(|e| ApiError::bad_request(format!("invalid selection body: {}", e)))?;
        let selected: Vec<String> = request.items.into_keys().collect();
        let items = state
            .service
            .select(&request.token, &selected, &cancel)
            .await?;
        return Ok(Json(items).into_response());
    }

    match state.service.translate_web(text, &cancel).await? {
        WebOutcome::Items(items) => Ok(Json(items).into_response()),
        WebOutcome::Selection { url, token, items } => Ok((
            StatusCode::MULTIPLE_CHOICES,
            Json(SelectionResponse::new(url, token, items)),
        )
            .into_response()),
    }
}

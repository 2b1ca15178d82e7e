use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use scrivener_codecs::{Format, UnsupportedFormatError};
use scrivener_core::matching::dedupe;
use scrivener_core::{Item, TargetType};

use crate::error::ApiError;
use crate::models::{ExportParams, ImportParams};
use crate::state::AppState;

/// Codecs are only served when the registry carries an entry for them, so
/// a reload can withdraw a format.
fn registered(state: &AppState, target: TargetType, id: &str) -> Result<(), ApiError> {
    let snapshot = state.service.snapshot();
    let format = Format::parse(id).map(|f| f.id()).unwrap_or(id);
    match snapshot.for_format(target, format) {
        Some(translator) => {
            tracing::debug!(translator = %translator.id, format, "codec selected");
            Ok(())
        }
        None => Err(UnsupportedFormatError {
            format: id.to_string(),
            valid: snapshot
                .by_target(target)
                .filter_map(|t| t.format().map(String::from))
                .collect(),
        }
        .into()),
    }
}

/// `POST /import?format=<hint>&dedupe=<bool>`
pub async fn import(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ImportParams>,
    body: Bytes,
) -> Result<Json<Vec<Item>>, ApiError> {
    // Gate on the format the payload will actually be decoded with.
    let format = scrivener_codecs::import_format(&body, params.format.as_deref())?;
    registered(&state, TargetType::Import, format.id())?;
    let mut items = scrivener_codecs::import_payload(&body, Some(format.id()))?;
    if params.dedupe {
        let before = items.len();
        items = dedupe(items);
        tracing::debug!(before, after = items.len(), "deduplicated import");
    }
    Ok(Json(items))
}

/// `POST /export?format=<id>` with a JSON array of items.
pub async fn export(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ExportParams>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let format = params
        .format
        .ok_or_else(|| ApiError::bad_request("missing 'format' query parameter"))?;
    registered(&state, TargetType::Export, &format)?;
    let items: Vec<Item> = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_request(format!("expected a JSON array of items: {}", e)))?;
    let exported = scrivener_codecs::export_items(&items, &format)?;
    Ok((
        [(header::CONTENT_TYPE, exported.content_type())],
        exported.bytes,
    )
        .into_response())
}

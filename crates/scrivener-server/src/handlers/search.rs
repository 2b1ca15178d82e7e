use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use scrivener_core::{CancellationToken, Item};

use crate::error::ApiError;
use crate::handlers::body_text;
use crate::state::AppState;

/// `POST /search`: resolve a DOI, ISBN, PMID or arXiv id.
pub async fn search(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<Vec<Item>>, ApiError> {
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let identifier = body_text(&body)?;
    let items = state.service.translate_search(identifier, &cancel).await?;
    Ok(Json(items))
}

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use scrivener_core::{LoadReport, TargetType, TranslatorInfo};

use crate::error::ApiError;
use crate::models::TranslatorsParams;
use crate::state::AppState;

/// `GET /translators?target=<type>`
pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TranslatorsParams>,
) -> Result<Json<Vec<TranslatorInfo>>, ApiError> {
    let target = match params.target.as_deref() {
        Some(name) => Some(TargetType::parse(name).ok_or_else(|| {
            ApiError::bad_request(format!(
                "unknown target '{}' (expected web, search, import or export)",
                name
            ))
        })?),
        None => None,
    };
    Ok(Json(state.service.translators(target)))
}

/// `POST /reload`: rebuild the registry and swap it in.
pub async fn reload(State(state): State<Arc<AppState>>) -> Result<Json<LoadReport>, ApiError> {
    let report = tokio::task::spawn_blocking(move || state.service.reload())
        .await
        .map_err(|e| ApiError {
            status: axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            kind: "reload_failed",
            message: e.to_string(),
        })?;
    tracing::info!(
        generation = report.generation,
        loaded = report.loaded,
        rejected = report.errors.len(),
        "registry reloaded"
    );
    Ok(Json(report))
}

//! Storage service surface: `POST /` ingests an origin URL, `DELETE /{name}` removes a
//! stored object. `RemoteStorageClient` speaks this protocol.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, HeaderValue, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;

use assetflow_core::{AppError, MediaCategory};
use assetflow_services::StoredMedia;

use crate::error::{HttpAppError, ValidatedJson};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreMediaRequest {
    pub media_type: MediaCategory,
    pub origin_url: String,
}

#[tracing::instrument(skip(state, request), fields(operation = "store_media", media_type = %request.media_type))]
pub async fn store_media(
    State(state): State<Arc<AppState>>,
    ValidatedJson(request): ValidatedJson<StoreMediaRequest>,
) -> Result<impl IntoResponse, HttpAppError> {
    let stored = state
        .pipeline
        .ingest(request.media_type, &request.origin_url)
        .await?;

    let location = HeaderValue::from_str(&stored.url)
        .map_err(|e| AppError::Internal(format!("Invalid stored URL: {}", e)))?;

    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(StoredMedia {
            locator: stored.name,
            url: stored.url,
        }),
    ))
}

#[tracing::instrument(skip(state), fields(operation = "delete_stored"))]
pub async fn delete_stored(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<StatusCode, HttpAppError> {
    if state.storage.delete(&name).await? {
        tracing::info!(storage_key = %name, "Stored object deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("File not found: {}", name)).into())
    }
}

//! Asset lifecycle endpoints for content authoring.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use assetflow_core::{AppError, AssetStatus, MediaAsset, NewMediaAsset};
use assetflow_db::ReleaseOutcome;

use crate::error::{HttpAppError, ValidatedJson};
use crate::state::AppState;

const DEFAULT_LIST_LIMIT: i64 = 100;
const MAX_LIST_LIMIT: i64 = 1000;

#[derive(Debug, Deserialize)]
pub struct ListAssetsQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplaceAssetResponse {
    pub released_id: i64,
    /// What happened to the previous asset: `REMOVED`, `DELETION_ENQUEUED` or
    /// `ALREADY_DELETING`.
    pub release: &'static str,
    pub asset: MediaAsset,
}

fn release_label(outcome: &ReleaseOutcome) -> &'static str {
    match outcome {
        ReleaseOutcome::Removed => "REMOVED",
        ReleaseOutcome::DeletionEnqueued(_) => "DELETION_ENQUEUED",
        ReleaseOutcome::AlreadyDeleting(_) => "ALREADY_DELETING",
        ReleaseOutcome::NotFound => "NOT_FOUND",
    }
}

fn asset_not_found(id: i64) -> HttpAppError {
    AppError::NotFound(format!("Asset {} not found", id)).into()
}

#[tracing::instrument(skip(state, request), fields(operation = "create_asset"))]
pub async fn create_asset(
    State(state): State<Arc<AppState>>,
    ValidatedJson(request): ValidatedJson<NewMediaAsset>,
) -> Result<impl IntoResponse, HttpAppError> {
    let asset = state.lifecycle.register(request).await?;
    tracing::info!(asset_id = asset.id, "Asset registered, upload queued");

    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, format!("/api/v0/assets/{}", asset.id))],
        Json(asset),
    ))
}

#[tracing::instrument(skip(state), fields(operation = "get_asset"))]
pub async fn get_asset(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<MediaAsset>, HttpAppError> {
    state
        .lifecycle
        .store()
        .get(id)
        .await?
        .map(Json)
        .ok_or_else(|| asset_not_found(id))
}

#[tracing::instrument(skip(state), fields(operation = "list_assets"))]
pub async fn list_assets(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListAssetsQuery>,
) -> Result<Json<Vec<MediaAsset>>, HttpAppError> {
    let status = query
        .status
        .as_deref()
        .ok_or_else(|| AppError::InvalidInput("status query parameter is required".to_string()))?
        .parse::<AssetStatus>()
        .map_err(|e| AppError::InvalidInput(e.to_string()))?;
    let limit = query
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, MAX_LIST_LIMIT);

    let assets = state.lifecycle.store().list_by_status(status, limit).await?;
    Ok(Json(assets))
}

/// 204 when the asset never reached storage and was dropped, 202 with the record when
/// a deletion is (or already was) pending.
#[tracing::instrument(skip(state), fields(operation = "release_asset"))]
pub async fn release_asset(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Response, HttpAppError> {
    match state.lifecycle.release(id).await? {
        ReleaseOutcome::Removed => Ok(StatusCode::NO_CONTENT.into_response()),
        ReleaseOutcome::DeletionEnqueued(asset) => {
            Ok((StatusCode::ACCEPTED, Json(asset)).into_response())
        }
        ReleaseOutcome::AlreadyDeleting(_) => match state.lifecycle.store().get(id).await? {
            Some(asset) => Ok((StatusCode::ACCEPTED, Json(asset)).into_response()),
            // Deleted by a consumer in between.
            None => Ok(StatusCode::NO_CONTENT.into_response()),
        },
        ReleaseOutcome::NotFound => Err(asset_not_found(id)),
    }
}

#[tracing::instrument(skip(state, request), fields(operation = "replace_asset"))]
pub async fn replace_asset(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    ValidatedJson(request): ValidatedJson<NewMediaAsset>,
) -> Result<impl IntoResponse, HttpAppError> {
    if state.lifecycle.store().get(id).await?.is_none() {
        return Err(asset_not_found(id));
    }

    let (released, asset) = state.lifecycle.replace(id, request).await?;
    tracing::info!(
        released_id = id,
        asset_id = asset.id,
        release = release_label(&released),
        "Asset replaced"
    );

    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, format!("/api/v0/assets/{}", asset.id))],
        Json(ReplaceAssetResponse {
            released_id: id,
            release: release_label(&released),
            asset,
        }),
    ))
}

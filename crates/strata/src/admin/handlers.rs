use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use uuid::Uuid;

use crate::admin::{AppState, RecordResponse, StatsSnapshot};
use crate::error::StrataError;
use crate::storage::{Placement, StoreRequest};

/// A [`StrataError`] rendered as a JSON error body
#[derive(Debug)]
pub struct ApiError(StrataError);

impl From<StrataError> for ApiError {
    fn from(err: StrataError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            StrataError::NotFound(_) => StatusCode::NOT_FOUND,
            StrataError::Capacity(_) => StatusCode::INSUFFICIENT_STORAGE,
            StrataError::Config(_) | StrataError::Serialization(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::warn!("Admin request failed: {}", self.0);
        }
        (status, Json(serde_json::json!({"error": self.0.to_string()}))).into_response()
    }
}

/// Health check endpoint - returns JSON status
pub async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

pub async fn stats_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<StatsSnapshot>, ApiError> {
    let store = state.store.stats().await?;

    Ok(Json(StatsSnapshot {
        store,
        scheduler: state.scheduler.as_ref().map(|s| s.stats()),
        search: state.search.as_ref().map(|s| s.stats()),
    }))
}

pub async fn store_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<StoreRequest>,
) -> Result<(StatusCode, Json<Placement>), ApiError> {
    let placement = state.store.store_request(request).await?;
    tracing::debug!(id = %placement.id, tier = %placement.tier, "Stored record via admin API");
    Ok((StatusCode::CREATED, Json(placement)))
}

pub async fn get_record_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<RecordResponse>, ApiError> {
    let tier = state
        .store
        .tier_of(id)
        .await?
        .ok_or(StrataError::NotFound(id))?;
    let record = state.store.get(id).await?.ok_or(StrataError::NotFound(id))?;

    Ok(Json(RecordResponse { tier, record }))
}

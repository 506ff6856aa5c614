//! Sync API endpoints
//!
//! Provides endpoints for multi-device synchronization.

use axum::{
    extract::State,
    routing::get,
    Extension, Json, Router,
};

use super::extract::{ApiJson, ApiQuery};
use crate::auth::AuthenticatedOwner;
use crate::error::Result;
use crate::state::AppState;
use crate::sync::{PullQuery, PushBatch, SyncRequest, SyncResponse, SyncStatus};

/// Create the sync router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(pull_changes).post(sync_changes))
        .route("/status", get(sync_status))
}

/// Push local changes and pull the merged state
async fn sync_changes(
    State(state): State<AppState>,
    Extension(owner): Extension<AuthenticatedOwner>,
    ApiJson(req): ApiJson<SyncRequest>,
) -> Result<Json<SyncResponse>> {
    let (device_id, cursor, batch) = req.into_batch();
    let result = state
        .coordinator()
        .sync(owner.owner_id, &device_id, cursor, batch)
        .await?;
    Ok(Json(result.into()))
}

/// Pull-only exchange; still advances the device cursor
async fn pull_changes(
    State(state): State<AppState>,
    Extension(owner): Extension<AuthenticatedOwner>,
    ApiQuery(query): ApiQuery<PullQuery>,
) -> Result<Json<SyncResponse>> {
    let result = state
        .coordinator()
        .sync(owner.owner_id, &query.device_id, query.since, PushBatch::default())
        .await?;
    Ok(Json(result.into()))
}

async fn sync_status(
    State(state): State<AppState>,
    Extension(owner): Extension<AuthenticatedOwner>,
) -> Result<Json<SyncStatus>> {
    let devices = state.store().device_cursors(owner.owner_id).await?;
    Ok(Json(SyncStatus::from_cursors(devices)))
}

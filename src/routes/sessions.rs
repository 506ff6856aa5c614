//! Timer session API routes

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, put},
    Extension, Json, Router,
};
use uuid::Uuid;

use super::extract::{ApiJson, ApiPath};
use super::fallback_device;
use crate::auth::AuthenticatedOwner;
use crate::db::{server_now, Session, SessionPayload, SessionWrite};
use crate::error::{AppError, Result};
use crate::state::AppState;

/// Create the session router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_sessions).post(create_session))
        .route("/:id", put(update_session).delete(delete_session))
}

/// List the owner's active sessions, latest start first
async fn list_sessions(
    State(state): State<AppState>,
    Extension(owner): Extension<AuthenticatedOwner>,
) -> Result<Json<Vec<Session>>> {
    let sessions = state.store().active_sessions(owner.owner_id).await?;
    Ok(Json(sessions))
}

async fn create_session(
    State(state): State<AppState>,
    Extension(owner): Extension<AuthenticatedOwner>,
    ApiJson(payload): ApiJson<SessionPayload>,
) -> Result<(StatusCode, Json<Session>)> {
    payload.validate()?;
    let write = SessionWrite::from_payload(
        Uuid::new_v4(),
        owner.owner_id,
        fallback_device(&owner),
        &payload,
    );

    let mut tx = state.store().begin().await?;
    let session = tx.insert_session(&write, server_now()).await?;
    tx.commit().await?;

    Ok((StatusCode::CREATED, Json(session)))
}

async fn update_session(
    State(state): State<AppState>,
    Extension(owner): Extension<AuthenticatedOwner>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<SessionPayload>,
) -> Result<Json<Session>> {
    payload.validate()?;
    let write = SessionWrite::from_payload(id, owner.owner_id, fallback_device(&owner), &payload);

    let mut tx = state.store().begin().await?;
    let session = tx
        .overwrite_session(&write, server_now())
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Session not found: {}", id)))?;
    tx.commit().await?;

    Ok(Json(session))
}

async fn delete_session(
    State(state): State<AppState>,
    Extension(owner): Extension<AuthenticatedOwner>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<StatusCode> {
    let mut tx = state.store().begin().await?;
    let buried = tx
        .tombstone_sessions(owner.owner_id, &[id], server_now())
        .await?;
    if buried.is_empty() {
        return Err(AppError::NotFound(format!("Session not found: {}", id)));
    }
    tx.commit().await?;

    Ok(StatusCode::NO_CONTENT)
}

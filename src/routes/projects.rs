//! Project API routes

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
use crate::db::{server_now, Project, ProjectPayload, ProjectWrite};
use crate::error::{AppError, Result};
use crate::state::AppState;

/// Create the project router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_projects).post(create_project))
        .route("/:id", put(update_project).delete(delete_project))
}

/// List the owner's active projects, newest first
async fn list_projects(
    State(state): State<AppState>,
    Extension(owner): Extension<AuthenticatedOwner>,
) -> Result<Json<Vec<Project>>> {
    let projects = state.store().active_projects(owner.owner_id).await?;
    Ok(Json(projects))
}

/// Create a project under a server-assigned id
async fn create_project(
    State(state): State<AppState>,
    Extension(owner): Extension<AuthenticatedOwner>,
    ApiJson(payload): ApiJson<ProjectPayload>,
) -> Result<(StatusCode, Json<Project>)> {
    payload.validate()?;
    let write = ProjectWrite::from_payload(
        Uuid::new_v4(),
        owner.owner_id,
        fallback_device(&owner),
        &payload,
    );

    let mut tx = state.store().begin().await?;
    let project = tx.insert_project(&write, server_now()).await?;
    tx.commit().await?;

    tracing::debug!(project = %project.id, owner = %owner.owner_id, "Project created");
    Ok((StatusCode::CREATED, Json(project)))
}

async fn update_project(
    State(state): State<AppState>,
    Extension(owner): Extension<AuthenticatedOwner>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<ProjectPayload>,
) -> Result<Json<Project>> {
    payload.validate()?;
    let write = ProjectWrite::from_payload(id, owner.owner_id, fallback_device(&owner), &payload);

    let mut tx = state.store().begin().await?;
    let project = tx
        .overwrite_project(&write, server_now())
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Project not found: {}", id)))?;
    tx.commit().await?;

    Ok(Json(project))
}

/// Tombstone a project
async fn delete_project(
    State(state): State<AppState>,
    Extension(owner): Extension<AuthenticatedOwner>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<StatusCode> {
    let mut tx = state.store().begin().await?;
    let buried = tx
        .tombstone_projects(owner.owner_id, &[id], server_now())
        .await?;
    if buried.is_empty() {
        return Err(AppError::NotFound(format!("Project not found: {}", id)));
    }
    tx.commit().await?;

    Ok(StatusCode::NO_CONTENT)
}

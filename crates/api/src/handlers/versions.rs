//! Handlers for board version history.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct VersionBody {
    pub version: Option<u64>,
}

/// GET /api/v1/boards/{id}/versions
///
/// Snapshot numbers, ascending.
pub async fn list_versions(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let versions = state.engine.versions().list(&id).await?;
    Ok(Json(DataResponse { data: versions }))
}

/// POST /api/v1/boards/{id}/versions
pub async fn create_snapshot(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let version = state.engine.versions().snapshot(&id).await?;
    tracing::info!(board = %id, version, "Snapshot created");
    Ok((
        StatusCode::CREATED,
        Json(DataResponse {
            data: VersionBody {
                version: Some(version),
            },
        }),
    ))
}

/// GET /api/v1/boards/{id}/versions/current
pub async fn current_version(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let version = state.engine.versions().current(&id).await?;
    Ok(Json(DataResponse {
        data: VersionBody { version },
    }))
}

/// POST /api/v1/boards/{id}/versions/{version}/restore
pub async fn restore_version(
    State(state): State<AppState>,
    Path((id, version)): Path<(String, u64)>,
) -> AppResult<impl IntoResponse> {
    let board = state.engine.versions().restore(&id, version).await?;
    Ok(Json(DataResponse { data: board }))
}

/// POST /api/v1/boards/{id}/undo
///
/// The restored board, or `null` when already at the oldest snapshot.
pub async fn undo(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let board = state.engine.versions().undo(&id).await?;
    Ok(Json(DataResponse { data: board }))
}

/// POST /api/v1/boards/{id}/redo
///
/// The restored board, or `null` when already at the newest snapshot.
pub async fn redo(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let board = state.engine.versions().redo(&id).await?;
    Ok(Json(DataResponse { data: board }))
}

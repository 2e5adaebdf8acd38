//! Handlers for board documents.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use boardwise_core::types::JsonMap;
use boardwise_core::Board;
use serde::Serialize;
use serde_json::Value;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Summary row of the board listing.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardSummary {
    pub name: String,
    pub version: u64,
    pub cards: usize,
    pub autopilot: bool,
}

/// GET /api/v1/boards
///
/// Every readable board. Malformed documents are skipped.
pub async fn list_boards(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let engine = &state.engine;
    let boards: Vec<BoardSummary> = engine
        .boards()
        .list()
        .await?
        .into_iter()
        .map(|b| BoardSummary {
            autopilot: engine.processes().is_running(&b.name),
            version: b.version,
            cards: b.cards.len(),
            name: b.name,
        })
        .collect();
    Ok(Json(DataResponse { data: boards }))
}

/// GET /api/v1/boards/{id}
///
/// The board with each card's last known value merged in.
pub async fn get_board(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let view = state.engine.boards().get(&id).await?;
    Ok(Json(DataResponse { data: view }))
}

/// PUT /api/v1/boards/{id}
///
/// Upsert. The body's `name` may be omitted; if present it must match
/// the path. Returns 201 on creation, 200 otherwise.
pub async fn put_board(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(mut body): Json<JsonMap>,
) -> AppResult<impl IntoResponse> {
    match body.get("name") {
        None => {
            body.insert("name".into(), Value::String(id.clone()));
        }
        Some(Value::String(name)) if *name == id => {}
        Some(other) => {
            return Err(AppError::BadRequest(format!(
                "Board name {other} does not match path id '{id}'"
            )));
        }
    }
    let board: Board = serde_json::from_value(Value::Object(body))
        .map_err(|e| AppError::BadRequest(format!("Invalid board document: {e}")))?;

    let outcome = state.engine.boards().put(board).await?;

    tracing::info!(
        board = %id,
        version = outcome.board.version,
        created = outcome.created,
        snapshot = ?outcome.snapshot,
        "Board saved",
    );

    let status = if outcome.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(DataResponse { data: outcome.board })))
}

/// DELETE /api/v1/boards/{id}
pub async fn delete_board(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    state.engine.delete_board(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

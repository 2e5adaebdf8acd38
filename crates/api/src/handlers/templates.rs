use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use boardwise_core::CoreError;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/templates
///
/// Registered card templates grouped by `group`, each group ordered by id.
pub async fn list_templates(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    Ok(Json(DataResponse {
        data: state.engine.registry().list(),
    }))
}

/// GET /api/v1/templates/{*id}
pub async fn get_template(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let template = state
        .engine
        .registry()
        .get(&id)
        .ok_or_else(|| CoreError::not_found("Card template", id))?;
    Ok(Json(DataResponse { data: template }))
}

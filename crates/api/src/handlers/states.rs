use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/states
///
/// `{ group: { tag: { name: value } } }`.
pub async fn state_tree(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    Ok(Json(DataResponse {
        data: state.engine.states().get_state_tree(),
    }))
}

/// GET /api/v1/states/{group}/{tag}
///
/// Flat `{ name: value }` map. Unknown tags yield an empty object.
pub async fn states_by_tag(
    State(state): State<AppState>,
    Path((group, tag)): Path<(String, String)>,
) -> AppResult<impl IntoResponse> {
    Ok(Json(DataResponse {
        data: state.engine.states().get_by_tag(&group, &tag),
    }))
}

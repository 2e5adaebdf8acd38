use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;

use crate::error::AppResult;
use crate::middleware::auth::Caller;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/boards/{id}/cards/{card}
///
/// Last stored value of a card without running it. Gated by the card's
/// read token.
pub async fn read_card_value(
    State(state): State<AppState>,
    Path((id, card)): Path<(String, String)>,
    Caller(access): Caller,
) -> AppResult<impl IntoResponse> {
    let value = state.engine.boards().read_value(&id, &card, &access).await?;
    Ok(Json(DataResponse { data: value }))
}

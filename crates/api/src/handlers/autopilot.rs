use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// POST /api/v1/boards/{id}/autopilot/{mode}
///
/// `mode` is `on` or `off`. Turning autopilot on refreshes the board's
/// value cards immediately instead of waiting for the next tick.
pub async fn set_autopilot(
    State(state): State<AppState>,
    Path((id, mode)): Path<(String, String)>,
) -> AppResult<impl IntoResponse> {
    let enable = match mode.as_str() {
        "on" => true,
        "off" => false,
        other => {
            return Err(AppError::BadRequest(format!(
                "Autopilot mode must be 'on' or 'off', got '{other}'"
            )))
        }
    };

    // 404 for unknown boards.
    state.engine.boards().get(&id).await?;

    let processes = state.engine.processes();
    let changed = if enable {
        processes.start(&id)
    } else {
        processes.stop(&id)
    };

    if enable && changed {
        match state.engine.poller().refresh_if_idle(&id).await {
            Ok(Some(values)) => tracing::debug!(board = %id, values, "Initial autopilot refresh"),
            Ok(None) => tracing::debug!(board = %id, "Board already refreshing"),
            Err(e) => tracing::warn!(board = %id, error = %e, "Initial autopilot refresh failed"),
        }
    }

    tracing::info!(board = %id, enabled = enable, changed, "Autopilot toggled");
    Ok(Json(DataResponse {
        data: json!({ "autopilot": processes.is_running(&id) }),
    }))
}

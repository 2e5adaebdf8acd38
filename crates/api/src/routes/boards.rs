//! Route definitions for boards and everything scoped to one board.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::{actions, autopilot, boards, cards, versions};
use crate::state::AppState;

/// Board routes mounted at `/boards`.
///
/// ```text
/// GET    /                              -> list_boards
/// GET    /{id}                          -> get_board
/// PUT    /{id}                          -> put_board
/// DELETE /{id}                          -> delete_board
/// GET    /{id}/actions                  -> list_actions
/// GET    /{id}/actions/{action}         -> run_action_query
/// POST   /{id}/actions/{action}         -> run_action_body
/// GET    /{id}/actions/{action}/status  -> action_status
/// GET    /{id}/cards/{card}             -> read_card_value
/// GET    /{id}/versions                 -> list_versions
/// POST   /{id}/versions                 -> create_snapshot
/// GET    /{id}/versions/current         -> current_version
/// POST   /{id}/versions/{version}/restore -> restore_version
/// POST   /{id}/undo                     -> undo
/// POST   /{id}/redo                     -> redo
/// POST   /{id}/autopilot/{mode}         -> set_autopilot
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(boards::list_boards))
        .route(
            "/{id}",
            get(boards::get_board)
                .put(boards::put_board)
                .delete(boards::delete_board),
        )
        .route("/{id}/actions", get(actions::list_actions))
        .route(
            "/{id}/actions/{action}",
            get(actions::run_action_query).post(actions::run_action_body),
        )
        .route("/{id}/actions/{action}/status", get(actions::action_status))
        .route("/{id}/cards/{card}", get(cards::read_card_value))
        .route(
            "/{id}/versions",
            get(versions::list_versions).post(versions::create_snapshot),
        )
        .route("/{id}/versions/current", get(versions::current_version))
        .route(
            "/{id}/versions/{version}/restore",
            post(versions::restore_version),
        )
        .route("/{id}/undo", post(versions::undo))
        .route("/{id}/redo", post(versions::redo))
        .route("/{id}/autopilot/{mode}", post(autopilot::set_autopilot))
}

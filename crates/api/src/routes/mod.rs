pub mod boards;
pub mod health;
pub mod states;
pub mod templates;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;
use crate::ws;

/// All routes mounted under `/api/v1`.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Event stream.
        .route("/ws", get(ws::ws_handler))
        // Boards plus their actions, cards, versions and autopilot.
        .nest("/boards", boards::router())
        // Last-known card values.
        .nest("/states", states::router())
        // Card template registry.
        .nest("/templates", templates::router())
}

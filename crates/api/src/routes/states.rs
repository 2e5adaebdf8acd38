use axum::routing::get;
use axum::Router;

use crate::handlers::states;
use crate::state::AppState;

/// State routes mounted at `/states`.
///
/// ```text
/// GET /              -> state_tree
/// GET /{group}/{tag} -> states_by_tag
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(states::state_tree))
        .route("/{group}/{tag}", get(states::states_by_tag))
}

//! Handlers for the action catalog and action runs.
//!
//! A run takes its params from the query string (GET) or a JSON object
//! body (POST). The reserved query keys `token` and `raw` are never passed
//! to the action. With `raw=true` the value comes back as a plain-text
//! body instead of the JSON envelope.

use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::{OriginalUri, Path, Query, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::Method;
use axum::response::{IntoResponse, Response};
use axum::Json;
use boardwise_core::types::JsonMap;
use boardwise_engine::{Access, RunRequest};
use serde_json::{json, Value};

use crate::error::{AppError, AppResult};
use crate::middleware::auth::{Caller, TOKEN_QUERY_PARAM};
use crate::response::DataResponse;
use crate::state::AppState;

/// Query flag selecting a plain-text response.
const RAW_QUERY_PARAM: &str = "raw";

/// GET /api/v1/boards/{id}/actions
pub async fn list_actions(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    // Unknown boards are a 404, not an empty catalog.
    state.engine.boards().get(&id).await?;
    Ok(Json(DataResponse {
        data: state.engine.catalog().list(&id),
    }))
}

/// GET /api/v1/boards/{id}/actions/{action}/status
///
/// `idle` for actions that never ran.
pub async fn action_status(
    State(state): State<AppState>,
    Path((id, action)): Path<(String, String)>,
) -> AppResult<impl IntoResponse> {
    Ok(Json(DataResponse {
        data: state.engine.dispatcher().status().get(&id, &action),
    }))
}

/// GET /api/v1/boards/{id}/actions/{action}
pub async fn run_action_query(
    State(state): State<AppState>,
    Path((id, action)): Path<(String, String)>,
    Query(mut query): Query<HashMap<String, String>>,
    OriginalUri(uri): OriginalUri,
    Caller(access): Caller,
) -> AppResult<Response> {
    let raw = take_raw_flag(&mut query);
    query.remove(TOKEN_QUERY_PARAM);

    let params: JsonMap = query
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();
    let request = json!({
        "method": Method::GET.as_str(),
        "path": uri.path(),
        "query": query,
    });

    run(&state, id, action, params, request, access, raw).await
}

/// POST /api/v1/boards/{id}/actions/{action}
///
/// An empty body runs with no params.
pub async fn run_action_body(
    State(state): State<AppState>,
    Path((id, action)): Path<(String, String)>,
    Query(mut query): Query<HashMap<String, String>>,
    OriginalUri(uri): OriginalUri,
    Caller(access): Caller,
    body: Bytes,
) -> AppResult<Response> {
    let raw = take_raw_flag(&mut query);
    query.remove(TOKEN_QUERY_PARAM);

    let params: JsonMap = if body.iter().all(u8::is_ascii_whitespace) {
        JsonMap::new()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::BadRequest(format!("Params must be a JSON object: {e}")))?
    };
    let request = json!({
        "method": Method::POST.as_str(),
        "path": uri.path(),
        "query": query,
        "body": params,
    });

    run(&state, id, action, params, request, access, raw).await
}

fn take_raw_flag(query: &mut HashMap<String, String>) -> bool {
    query
        .remove(RAW_QUERY_PARAM)
        .is_some_and(|v| v == "true" || v == "1")
}

async fn run(
    state: &AppState,
    board: String,
    action: String,
    params: JsonMap,
    request: Value,
    access: Access,
    raw: bool,
) -> AppResult<Response> {
    tracing::debug!(board = %board, action = %action, raw, "Running action over HTTP");

    let value = state
        .engine
        .run_action(
            RunRequest::new(board, action)
                .with_params(params)
                .with_request(request)
                .with_access(access),
        )
        .await?;

    if raw {
        let text = match value {
            Value::String(s) => s,
            Value::Null => String::new(),
            other => other.to_string(),
        };
        return Ok(([(CONTENT_TYPE, "text/plain; charset=utf-8")], text).into_response());
    }
    Ok(Json(DataResponse { data: value }).into_response())
}

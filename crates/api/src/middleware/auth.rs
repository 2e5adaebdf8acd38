//! Caller access extractor.
//!
//! Every card-gated endpoint takes a [`Caller`]. A valid bearer token with
//! the `service` or `admin` role makes the caller privileged; otherwise the
//! card token comes from `?token=` or the `x-board-token` header.

use std::collections::HashMap;

use axum::extract::{FromRequestParts, Query};
use axum::http::request::Parts;
use boardwise_engine::Access;

use crate::error::AppError;
use crate::state::AppState;

/// Header carrying a card read/run token.
pub const BOARD_TOKEN_HEADER: &str = "x-board-token";

/// Query parameter carrying a card read/run token.
pub const TOKEN_QUERY_PARAM: &str = "token";

/// Access level of the current request.
#[derive(Debug, Clone, PartialEq)]
pub struct Caller(pub Access);

impl FromRequestParts<AppState> for Caller {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(header) = parts.headers.get("authorization") {
            let header = header
                .to_str()
                .map_err(|_| AppError::Unauthorized("Malformed Authorization header".into()))?;
            let token = header.strip_prefix("Bearer ").ok_or_else(|| {
                AppError::Unauthorized(
                    "Invalid Authorization format. Expected: Bearer <token>".into(),
                )
            })?;
            let claims = state
                .engine
                .signer()
                .validate(token)
                .map_err(|_| AppError::Unauthorized("Invalid or expired token".into()))?;
            if claims.is_privileged() {
                return Ok(Caller(Access::Privileged));
            }
            tracing::debug!(sub = %claims.sub, role = %claims.role, "Bearer token is not privileged");
        }

        let from_query = Query::<HashMap<String, String>>::try_from_uri(&parts.uri)
            .ok()
            .and_then(|Query(mut q)| q.remove(TOKEN_QUERY_PARAM));
        let token = from_query.or_else(|| {
            parts
                .headers
                .get(BOARD_TOKEN_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        });

        Ok(Caller(Access::Token(token)))
    }
}

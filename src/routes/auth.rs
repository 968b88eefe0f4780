//! Shared-secret API key check applied in front of every route.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::warn;

use super::{ApiError, AppState};

pub const API_KEY_HEADER: &str = "x-api-key";

/// Byte comparison that does not stop at the first mismatch.
fn keys_match(given: &[u8], expected: &[u8]) -> bool {
    given.len() == expected.len()
        && given
            .iter()
            .zip(expected)
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

pub async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    // ---
    let given = request
        .headers()
        .get(API_KEY_HEADER)
        .map(|v| v.as_bytes())
        .unwrap_or_default();

    if !keys_match(given, state.api_key.as_bytes()) {
        warn!(
            method = %request.method(),
            uri = %request.uri(),
            "Rejected request with missing or invalid API key"
        );
        return ApiError::unauthorized("missing or invalid API key").into_response();
    }

    next.run(request).await
}

//! HTTP gateway for the relay.
//!
//! Each route group lives in its own sibling module and exports a subrouter;
//! this module merges them, puts the API key check in front of all of them
//! and attaches the shared [`AppState`].

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::rejection::JsonRejection,
    http::{Method, StatusCode, Uri},
    middleware,
    response::{IntoResponse, Response},
    Json, Router,
};
use serde_json::json;

use crate::dispatch::{DeliveryResult, Dispatcher};
use crate::error::StoreError;
use crate::thresholds::ThresholdTable;
use crate::tokens::TokenStore;

mod alert;
mod auth;
mod broadcast;
mod maintenance;
mod register;
mod send;
mod status;

pub use auth::API_KEY_HEADER;

// ---

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub store: Arc<dyn TokenStore>,
    pub thresholds: Arc<ThresholdTable>,
    pub api_key: Arc<str>,
    pub started_at: Instant,
}

pub fn router(state: AppState) -> Router {
    // ---
    Router::new()
        .merge(status::router())
        .merge(register::router())
        .merge(send::router())
        .merge(broadcast::router())
        .merge(alert::router())
        .merge(maintenance::router())
        .fallback(not_found)
        .method_not_allowed_fallback(method_not_allowed)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_api_key,
        ))
        .with_state(state)
}

/// Error reply: an HTTP status plus `{"success": false, "error": ...}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }
}

async fn not_found(uri: Uri) -> ApiError {
    ApiError::not_found(format!("no route for {}", uri.path()))
}

async fn method_not_allowed(method: Method, uri: Uri) -> ApiError {
    ApiError {
        status: StatusCode::METHOD_NOT_ALLOWED,
        message: format!("{} not allowed on {}", method, uri.path()),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(json!({ "success": false, "error": self.message })),
        )
            .into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::bad_request(format!("invalid request body: {}", rejection.body_text()))
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::InvalidToken(_) => ApiError::bad_request(e.to_string()),
            other => {
                tracing::error!("Token store failure: {}", other);
                ApiError {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    message: "token store unavailable".to_string(),
                }
            }
        }
    }
}

/// Reject blank required string fields.
fn require_field<'a>(value: &'a str, name: &str) -> Result<&'a str, ApiError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ApiError::bad_request(format!("{name} is required")));
    }
    Ok(trimmed)
}

/// Single-send reply. Delivery failures are a 200 with `success: false`.
fn delivery_response(result: DeliveryResult) -> Response {
    // ---
    let body = if result.success {
        json!({ "success": true, "messageId": result.message_id })
    } else {
        json!({
            "success": false,
            "error": result.error,
            "reason": result.reason,
            "attempts": result.attempts
        })
    };
    (StatusCode::OK, Json(body)).into_response()
}

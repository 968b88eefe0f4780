//! Device token registration.

use axum::{
    extract::{rejection::JsonRejection, State},
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use super::{require_field, ApiError, AppState};
use crate::tokens::TokenMetadata;

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/register", post(register))
        .route("/unregister", post(unregister))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterRequest {
    #[serde(default)]
    fcm_token: String,
    #[serde(default)]
    user_data: TokenMetadata,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UnregisterRequest {
    #[serde(default)]
    fcm_token: String,
}

async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    // ---
    let Json(request) = payload?;
    let token = require_field(&request.fcm_token, "fcmToken")?;
    info!(platform = ?request.user_data.platform, "POST /register");

    let record = state.store.upsert(token, request.user_data).await?;
    Ok(Json(json!({ "success": true, "lastSeen": record.last_seen })))
}

async fn unregister(
    State(state): State<AppState>,
    payload: Result<Json<UnregisterRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    // ---
    let Json(request) = payload?;
    let token = require_field(&request.fcm_token, "fcmToken")?;
    info!("POST /unregister");

    state.store.remove(token).await?;
    Ok(Json(json!({ "success": true })))
}

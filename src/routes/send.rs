//! Single-device notification.

use axum::{
    extract::{rejection::JsonRejection, State},
    response::Response,
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use super::{delivery_response, require_field, ApiError, AppState};
use crate::dispatch::Envelope;

pub fn router() -> Router<AppState> {
    Router::new().route("/send", post(send))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendRequest {
    #[serde(default)]
    fcm_token: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    body: String,
    #[serde(default)]
    data: Option<Value>,
}

async fn send(
    State(state): State<AppState>,
    payload: Result<Json<SendRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    // ---
    let Json(request) = payload?;
    let token = require_field(&request.fcm_token, "fcmToken")?;
    let title = require_field(&request.title, "title")?;
    let body = require_field(&request.body, "body")?;
    info!("POST /send");

    let envelope = Envelope::to_token(token, title, body)
        .with_data("type", "custom")
        .with_data_object(request.data);

    Ok(delivery_response(state.dispatcher.send(envelope).await))
}

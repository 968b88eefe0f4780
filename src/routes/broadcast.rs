//! Notification to every registered device.

use axum::{
    extract::{rejection::JsonRejection, State},
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use super::{require_field, ApiError, AppState};
use crate::dispatch::{notify_devices, Envelope};

pub fn router() -> Router<AppState> {
    Router::new().route("/broadcast", post(broadcast))
}

#[derive(Debug, Deserialize)]
struct BroadcastRequest {
    #[serde(default)]
    title: String,
    #[serde(default)]
    body: String,
    #[serde(default)]
    data: Option<Value>,
}

/// `success` is true only when no device send failed.
async fn broadcast(
    State(state): State<AppState>,
    payload: Result<Json<BroadcastRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    // ---
    let Json(request) = payload?;
    let title = require_field(&request.title, "title")?;
    let body = require_field(&request.body, "body")?;
    info!("POST /broadcast");

    let envelope = Envelope::broadcast(title, body)
        .with_data("type", "broadcast")
        .with_data_object(request.data);
    let summary = notify_devices(state.store.as_ref(), &state.dispatcher, &envelope).await;

    Ok(Json(json!({
        "success": summary.failed_sends == 0,
        "totalRecipients": summary.total_recipients,
        "successfulSends": summary.successful_sends,
        "failedSends": summary.failed_sends,
        "results": summary.results
    })))
}

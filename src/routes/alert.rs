//! Water-quality alert built from a posted sensor reading.

use axum::{
    extract::{rejection::JsonRejection, State},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use super::{delivery_response, require_field, ApiError, AppState};
use crate::classifier::classify_document;
use crate::dispatch::alert_envelope;
use crate::models::{most_severe, Severity};

pub fn router() -> Router<AppState> {
    Router::new().route("/alert", post(alert))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AlertRequest {
    #[serde(default)]
    fcm_token: String,
    #[serde(default)]
    sensor_data: Value,
}

/// Classifies `sensorData` and sends the most severe alert. A reading with
/// nothing above `normal` sends nothing and reports `success: false`.
async fn alert(
    State(state): State<AppState>,
    payload: Result<Json<AlertRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    // ---
    let Json(request) = payload?;
    let token = require_field(&request.fcm_token, "fcmToken")?;
    if !request.sensor_data.is_object() {
        return Err(ApiError::bad_request("sensorData must be an object"));
    }

    let alerts = classify_document(&request.sensor_data, &state.thresholds);
    let Some(top) = most_severe(&alerts) else {
        info!("POST /alert with nothing to report");
        return Ok(Json(json!({
            "success": false,
            "error": "sensorData contains no alert condition"
        }))
        .into_response());
    };
    info!(parameter = %top.parameter, severity = %top.severity, "POST /alert");

    let envelope = alert_envelope(top)
        .retarget(token)
        .with_data(
            "alertCount",
            alerts.iter().filter(|a| a.severity > Severity::Normal).count(),
        );

    Ok(delivery_response(state.dispatcher.send(envelope).await))
}

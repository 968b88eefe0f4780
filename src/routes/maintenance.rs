//! Maintenance reminders.

use axum::{
    extract::{rejection::JsonRejection, State},
    response::Response,
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use tracing::info;

use super::{delivery_response, require_field, ApiError, AppState};
use crate::dispatch::{maintenance_envelope, ReminderData};

pub fn router() -> Router<AppState> {
    Router::new().route("/maintenance", post(maintenance))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MaintenanceRequest {
    #[serde(default)]
    fcm_token: String,
    reminder_data: Option<ReminderData>,
}

async fn maintenance(
    State(state): State<AppState>,
    payload: Result<Json<MaintenanceRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    // ---
    let Json(request) = payload?;
    let token = require_field(&request.fcm_token, "fcmToken")?;
    let reminder = request
        .reminder_data
        .ok_or_else(|| ApiError::bad_request("reminderData is required"))?;
    require_field(&reminder.task, "reminderData.task")?;
    info!(task = %reminder.task, "POST /maintenance");

    let envelope = maintenance_envelope(&reminder).retarget(token);
    Ok(delivery_response(state.dispatcher.send(envelope).await))
}

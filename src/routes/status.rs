//! Service status (`GET /`) and self-description (`GET /info`).

use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};

use super::AppState;
use crate::dispatch::NOTIFICATION_TYPES;

const SERVICE_NAME: &str = "aquawatch-relay";
const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/", get(status))
        .route("/info", get(info))
}

/// Liveness plus whether the push gateway provider is wired up.
async fn status(State(state): State<AppState>) -> Json<Value> {
    // ---
    Json(json!({
        "status": "ok",
        "version": VERSION,
        "uptime": state.started_at.elapsed().as_secs_f64(),
        "firebase": state.dispatcher.has_provider("fcm")
    }))
}

async fn info(State(state): State<AppState>) -> Json<Value> {
    // ---
    tracing::info!("GET /info");
    Json(json!({
        "success": true,
        "service": SERVICE_NAME,
        "version": VERSION,
        "endpoints": [
            { "method": "GET",  "path": "/",            "description": "Service status" },
            { "method": "GET",  "path": "/info",        "description": "Service description" },
            { "method": "POST", "path": "/register",    "description": "Register or refresh a device token" },
            { "method": "POST", "path": "/unregister",  "description": "Forget a device token" },
            { "method": "POST", "path": "/send",        "description": "Send a notification to one device" },
            { "method": "POST", "path": "/broadcast",   "description": "Send a notification to every registered device" },
            { "method": "POST", "path": "/alert",       "description": "Send a water-quality alert built from sensor data" },
            { "method": "POST", "path": "/maintenance", "description": "Send a maintenance reminder" }
        ],
        "supportedNotificationTypes": NOTIFICATION_TYPES,
        "providers": state.dispatcher.provider_names(),
        "tokenStore": state.store.backend()
    }))
}

//! HTTP surface tests, driven in-process through the router.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::util::ServiceExt;

use aquawatch_relay::routes::{self, AppState, API_KEY_HEADER};
use aquawatch_relay::{default_thresholds, Dispatcher, FileTokenStore, TokenStore};

mod common;
use common::{test_dispatch_config, RecordingProvider};

const KEY: &str = "test-api-key";

struct Harness {
    app: Router,
    provider: Arc<RecordingProvider>,
    store: Arc<FileTokenStore>,
    _dir: TempDir,
}

fn harness(provider: Arc<RecordingProvider>) -> Harness {
    // ---
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileTokenStore::new(dir.path().join("tokens.json")));

    let mut dispatcher = Dispatcher::new(test_dispatch_config());
    dispatcher.register_provider("fcm", provider.clone()).unwrap();

    let app = routes::router(AppState {
        dispatcher: Arc::new(dispatcher),
        store: store.clone(),
        thresholds: Arc::new(default_thresholds()),
        api_key: KEY.into(),
        started_at: Instant::now(),
    });

    Harness {
        app,
        provider,
        store,
        _dir: dir,
    }
}

/// Send a request with the API key and decode the JSON reply.
async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    call_with_key(app, method, uri, body, Some(KEY)).await
}

async fn call_with_key(
    app: &Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
    key: Option<&str>,
) -> (StatusCode, Value) {
    // ---
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(key) = key {
        builder = builder.header(API_KEY_HEADER, key);
    }
    let body = match body {
        Some(json) => Body::from(serde_json::to_vec(&json).unwrap()),
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        json!({})
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn rejects_missing_or_wrong_api_key() {
    // ---
    let h = harness(RecordingProvider::always(true));
    let payload = json!({"fcmToken": "tok", "title": "t", "body": "b"});

    let (status, body) = call_with_key(&h.app, "POST", "/send", Some(payload.clone()), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);

    let (status, _) =
        call_with_key(&h.app, "POST", "/send", Some(payload), Some("guess")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = call_with_key(&h.app, "GET", "/", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    assert_eq!(h.provider.calls(), 0);
}

#[tokio::test]
async fn unknown_routes_reply_with_json() {
    // ---
    let h = harness(RecordingProvider::always(true));

    let (status, body) = call(&h.app, "POST", "/notify", Some(json!({}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "no route for /notify");

    let (status, body) = call(&h.app, "GET", "/send", None).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(body["success"], false);

    let (status, _) = call_with_key(&h.app, "GET", "/nowhere", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn status_and_info() {
    // ---
    let h = harness(RecordingProvider::always(true));

    let (status, body) = call(&h.app, "GET", "/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["firebase"], true);
    assert!(body["uptime"].as_f64().unwrap() >= 0.0);
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));

    let (status, body) = call(&h.app, "GET", "/info", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["service"], "aquawatch-relay");
    let types = body["supportedNotificationTypes"].as_array().unwrap();
    assert!(types.contains(&json!("sensor_alert")));
    assert!(types.contains(&json!("maintenance")));
    let paths: Vec<_> = body["endpoints"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["path"].as_str().unwrap())
        .collect();
    for path in ["/", "/info", "/register", "/send", "/broadcast", "/alert", "/maintenance"] {
        assert!(paths.contains(&path), "{path} missing from /info");
    }
}

#[tokio::test]
async fn register_upserts_one_record_per_token() {
    // ---
    let h = harness(RecordingProvider::always(true));
    let payload = json!({
        "fcmToken": "device-1",
        "userData": {"userId": "u-1", "platform": "android", "deviceInfo": {"model": "Pixel 8"}}
    });

    let (status, body) = call(&h.app, "POST", "/register", Some(payload)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert!(body["lastSeen"].is_string());

    let (status, _) = call(
        &h.app,
        "POST",
        "/register",
        Some(json!({"fcmToken": "device-1", "userData": {"platform": "ios"}})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let records = h.store.list().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].user_id.as_deref(), Some("u-1"));
    assert_eq!(records[0].platform.as_deref(), Some("ios"));
    assert!(records[0].last_seen >= records[0].created_at);
}

#[tokio::test]
async fn register_validates_token() {
    // ---
    let h = harness(RecordingProvider::always(true));

    let (status, body) = call(&h.app, "POST", "/register", Some(json!({"fcmToken": "  "}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let (status, _) = call(&h.app, "POST", "/register", Some(json!({"userData": {}}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(h.store.list().await.is_empty());
}

#[tokio::test]
async fn unregister_is_idempotent() {
    // ---
    let h = harness(RecordingProvider::always(true));
    call(&h.app, "POST", "/register", Some(json!({"fcmToken": "gone"}))).await;

    for _ in 0..2 {
        let (status, body) =
            call(&h.app, "POST", "/unregister", Some(json!({"fcmToken": "gone"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
    }
    assert!(h.store.list().await.is_empty());
}

#[tokio::test]
async fn send_delivers_with_custom_data() {
    // ---
    let h = harness(RecordingProvider::always(true));
    let (status, body) = call(
        &h.app,
        "POST",
        "/send",
        Some(json!({"fcmToken": "device-1", "title": "Hello", "body": "World", "data": {"screen": "home"}})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["messageId"], "projects/test/messages/1");

    let sent = h.provider.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].token(), Some("device-1"));
    assert_eq!(sent[0].data["type"], "custom");
    assert_eq!(sent[0].data["screen"], "home");
}

#[tokio::test]
async fn send_reports_exhausted_retries_as_body() {
    // ---
    let h = harness(RecordingProvider::always(false));
    let (status, body) = call(
        &h.app,
        "POST",
        "/send",
        Some(json!({"fcmToken": "device-1", "title": "Hello", "body": "World"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(body["attempts"], 3);
    assert_eq!(body["reason"], "exhausted");
    assert_eq!(h.provider.calls(), 3);
}

#[tokio::test]
async fn send_validates_body() {
    // ---
    let h = harness(RecordingProvider::always(true));

    let (status, body) =
        call(&h.app, "POST", "/send", Some(json!({"fcmToken": "d", "body": "b"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "title is required");

    let response = h
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/send")
                .header("content-type", "application/json")
                .header(API_KEY_HEADER, KEY)
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(h.provider.calls(), 0);
}

#[tokio::test]
async fn broadcast_reaches_every_registered_device() {
    // ---
    // second device fails all three attempts
    let h = harness(RecordingProvider::scripted(&[true, false, false, false, true], true));
    for token in ["a", "b", "c"] {
        call(&h.app, "POST", "/register", Some(json!({"fcmToken": token}))).await;
    }

    let (status, body) = call(
        &h.app,
        "POST",
        "/broadcast",
        Some(json!({"title": "Maintenance window", "body": "Sensors offline at 02:00"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalRecipients"], 3);
    assert_eq!(body["successfulSends"], 2);
    assert_eq!(body["failedSends"], 1);
    assert_eq!(body["success"], false);
    assert_eq!(body["results"].as_array().unwrap().len(), 3);
    assert_eq!(body["results"][1]["token"], "b");
    assert_eq!(body["results"][1]["success"], false);
    assert_eq!(h.provider.calls(), 5);
}

#[tokio::test]
async fn alert_sends_most_severe_condition() {
    // ---
    let h = harness(RecordingProvider::always(true));
    let (status, body) = call(
        &h.app,
        "POST",
        "/alert",
        Some(json!({
            "fcmToken": "device-1",
            "sensorData": {"pH": 9.2, "temperature": 27, "salinity": 20, "turbidity": 5}
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let sent = h.provider.sent();
    assert_eq!(sent[0].title, "Water Quality Alert: pH High");
    assert_eq!(sent[0].data["type"], "sensor_alert");
    assert_eq!(sent[0].data["parameter"], "pH");
    assert_eq!(sent[0].data["alertCount"], 1);
}

#[tokio::test]
async fn alert_rejects_calm_or_malformed_readings() {
    // ---
    let h = harness(RecordingProvider::always(true));

    let (status, body) = call(
        &h.app,
        "POST",
        "/alert",
        Some(json!({"fcmToken": "device-1", "sensorData": {"temperature": 27, "salinity": 20}})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "sensorData contains no alert condition");

    let (status, _) = call(
        &h.app,
        "POST",
        "/alert",
        Some(json!({"fcmToken": "device-1", "sensorData": "pH=9"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(h.provider.calls(), 0);
}

#[tokio::test]
async fn maintenance_reminder() {
    // ---
    let h = harness(RecordingProvider::always(true));

    let (status, body) = call(
        &h.app,
        "POST",
        "/maintenance",
        Some(json!({
            "fcmToken": "device-1",
            "reminderData": {"task": "Clean turbidity sensor", "dueDate": "2024-07-01"}
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let sent = h.provider.sent();
    assert_eq!(sent[0].title, "Maintenance Reminder");
    assert_eq!(sent[0].body, "Clean turbidity sensor is due on 2024-07-01");
    assert_eq!(sent[0].data["type"], "maintenance");

    let (status, body) =
        call(&h.app, "POST", "/maintenance", Some(json!({"fcmToken": "device-1"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "reminderData is required");
}

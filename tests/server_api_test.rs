//! Ingestion service tests driven in-process through the axum router.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use eeg_relay::config::ServerConfig;
use eeg_relay::network::signing::{AuthHeaders, SignatureAlgorithm};
use eeg_relay::network::wire::{
    CLEAN_PATH, HEALTH_PATH, LATEST_PATH, LEGACY_GET_PATH, LEGACY_UPLOAD_PATH,
    REALTIME_UPLOAD_PATH,
};
use eeg_relay::server::{router, AppState};
use serde_json::{json, Value};
use tower::ServiceExt;

const SECRET: &str = "server-secret";

fn server_config() -> ServerConfig {
    ServerConfig {
        secret: SECRET.to_string(),
        ..ServerConfig::default()
    }
}

fn app_with(config: &ServerConfig) -> (Router, AppState) {
    let state = AppState::in_memory(config);
    (router(state.clone()), state)
}

fn signed_post(path: &str, body: Value, secret: &str) -> Request<Body> {
    let headers = AuthHeaders::generate(secret, SignatureAlgorithm::Sha1);
    let mut builder = Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json");
    for (name, value) in headers.pairs() {
        builder = builder.header(name, value);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(path: &str) -> Request<Body> {
    Request::builder().uri(path).body(Body::empty()).unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

async fn upload(app: &Router, user_id: Value, data: &str) -> (StatusCode, Value) {
    send(
        app,
        signed_post(
            REALTIME_UPLOAD_PATH,
            json!({ "user_id": user_id, "waveform_data": data }),
            SECRET,
        ),
    )
    .await
}

#[tokio::test]
async fn test_health() {
    let (app, _) = app_with(&server_config());
    let (status, body) = send(&app, get(HEALTH_PATH)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_missing_auth_headers_is_401_without_mutation() {
    let (app, state) = app_with(&server_config());
    let request = Request::builder()
        .method("POST")
        .uri(REALTIME_UPLOAD_PATH)
        .header("content-type", "application/json")
        .body(Body::from(
            json!({ "user_id": "1", "waveform_data": "AAAA" }).to_string(),
        ))
        .unwrap();

    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
    assert!(state.queue.entries("1").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_wrong_secret_is_403_without_mutation() {
    let (app, state) = app_with(&server_config());
    let request = signed_post(
        REALTIME_UPLOAD_PATH,
        json!({ "user_id": "1", "waveform_data": "AAAA" }),
        "not-the-secret",
    );
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "Invalid signature");
    assert!(state.queue.entries("1").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_replayed_request_rejected() {
    let (app, _) = app_with(&server_config());
    let request = || signed_post(CLEAN_PATH, json!({ "user_id": "1" }), SECRET);

    let first = request();
    let headers = first.headers().clone();
    assert_eq!(send(&app, first).await.0, StatusCode::OK);

    let mut replay = Request::builder()
        .method("POST")
        .uri(CLEAN_PATH)
        .header("content-type", "application/json");
    for (name, value) in headers.iter() {
        replay = replay.header(name, value);
    }
    let replay = replay
        .body(Body::from(json!({ "user_id": "1" }).to_string()))
        .unwrap();
    assert_eq!(send(&app, replay).await.0, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_replay_allowed_when_window_disabled() {
    let config = ServerConfig {
        replay_window_secs: 0,
        ..server_config()
    };
    let (app, _) = app_with(&config);
    let headers = AuthHeaders::with_values(
        SECRET,
        SignatureAlgorithm::Sha1,
        "1000".to_string(),
        "123456".to_string(),
    );
    for _ in 0..2 {
        let mut builder = Request::builder()
            .method("POST")
            .uri(CLEAN_PATH)
            .header("content-type", "application/json");
        for (name, value) in headers.pairs() {
            builder = builder.header(name, value);
        }
        let request = builder
            .body(Body::from(json!({ "user_id": "1" }).to_string()))
            .unwrap();
        assert_eq!(send(&app, request).await.0, StatusCode::OK);
    }
}

#[tokio::test]
async fn test_bad_bodies_are_400() {
    let (app, _) = app_with(&server_config());
    let (status, _) = upload(&app, json!(""), "AAAA").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = upload(&app, json!("1"), "").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let headers = AuthHeaders::generate(SECRET, SignatureAlgorithm::Sha1);
    let mut builder = Request::builder().method("POST").uri(REALTIME_UPLOAD_PATH);
    for (name, value) in headers.pairs() {
        builder = builder.header(name, value);
    }
    let request = builder.body(Body::from("{not json")).unwrap();
    assert_eq!(send(&app, request).await.0, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, get(LATEST_PATH)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_queue_keeps_capacity_highest_entries() {
    let (app, state) = app_with(&server_config());
    for i in 1..=13 {
        let (status, body) = upload(&app, json!(42), &format!("img{i}")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["timestamp"].as_str().unwrap().len(), 19);
    }

    let ids: Vec<u64> = state
        .queue
        .entries("42")
        .await
        .unwrap()
        .iter()
        .map(|e| e.sequence_id)
        .collect();
    assert_eq!(ids, (4..=13).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_latest_read_prunes_to_one() {
    let (app, state) = app_with(&server_config());
    for i in 1..=13 {
        upload(&app, json!("42"), &format!("img{i}")).await;
    }

    let (status, body) = send(&app, get(&format!("{LATEST_PATH}?user_id=42"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["waveform_data"], "img13");

    let remaining = state.queue.entries("42").await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].sequence_id, 13);

    // Reading again returns the same survivor.
    let (status, body) = send(&app, get(&format!("{LATEST_PATH}?user_id=42"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["waveform_data"], "img13");
}

#[tokio::test]
async fn test_clean_returns_count_then_not_found() {
    let (app, _) = app_with(&server_config());
    for i in 1..=4 {
        upload(&app, json!("7"), &format!("img{i}")).await;
    }
    upload(&app, json!("8"), "other").await;

    let (status, body) = send(
        &app,
        signed_post(CLEAN_PATH, json!({ "user_id": 7 }), SECRET),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted_count"], 4);

    let (status, body) = send(&app, get(&format!("{LATEST_PATH}?user_id=7"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);

    let (status, _) = send(&app, get(&format!("{LATEST_PATH}?user_id=8"))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_data_url_prefix_stripped() {
    let (app, state) = app_with(&server_config());
    upload(&app, json!("3"), "data:image/png;base64,QUJD").await;
    let entries = state.queue.entries("3").await.unwrap();
    assert_eq!(entries[0].payload, "QUJD");
}

#[tokio::test]
async fn test_legacy_slot_upserts_and_reads_without_pruning() {
    let (app, state) = app_with(&server_config());
    assert_eq!(
        send(&app, get(&format!("{LEGACY_GET_PATH}?user_id=5"))).await.0,
        StatusCode::NOT_FOUND
    );

    for data in ["first", "second"] {
        let (status, _) = send(
            &app,
            signed_post(
                LEGACY_UPLOAD_PATH,
                json!({ "user_id": "5", "waveform_data": data, "api_key": SECRET }),
                SECRET,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    for _ in 0..2 {
        let (status, body) = send(&app, get(&format!("{LEGACY_GET_PATH}?user_id=5"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["waveform_data"], "second");
    }
    // The legacy path never touches the queue.
    assert!(state.queue.entries("5").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_signed_reads_when_required() {
    let config = ServerConfig {
        require_signed_reads: true,
        ..server_config()
    };
    let (app, _) = app_with(&config);
    let (status, _) = send(&app, get(&format!("{LATEST_PATH}?user_id=1"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let headers = AuthHeaders::generate(SECRET, SignatureAlgorithm::Sha1);
    let mut builder = Request::builder().uri(format!("{LATEST_PATH}?user_id=1"));
    for (name, value) in headers.pairs() {
        builder = builder.header(name, value);
    }
    let (status, _) = send(&app, builder.body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_legacy_upload_requires_configured_api_key() {
    let config = ServerConfig {
        legacy_api_key: Some("legacy-key".to_string()),
        ..server_config()
    };
    let (app, state) = app_with(&config);
    let legacy = |body: Value| signed_post(LEGACY_UPLOAD_PATH, body, SECRET);

    let (status, body) = send(
        &app,
        legacy(json!({ "user_id": "5", "waveform_data": "AAAA", "api_key": SECRET })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "Invalid API key");

    let (status, _) = send(&app, legacy(json!({ "user_id": "5", "waveform_data": "AAAA" }))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(state.slots.get("5").is_none());

    let (status, _) = send(
        &app,
        legacy(json!({ "user_id": "5", "waveform_data": "AAAA", "api_key": "legacy-key" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(state.slots.get("5").unwrap().payload, "AAAA");
}

//! Offline delivery against the real ingestion service and transfer receiver.

mod common;

use common::{client_config, sine_recording, write_recording, SESSION};
use eeg_relay::config::{ServerConfig, TransferConfig};
use eeg_relay::data::CapturePipeline;
use eeg_relay::delivery::send_recording;
use eeg_relay::network::client::WaveformClient;
use eeg_relay::network::transfer::TransferReceiver;
use eeg_relay::server::{router, AppState};
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;

const LEGACY_KEY: &str = "legacy-key";

async fn start_service() -> (String, AppState) {
    let config = ServerConfig {
        secret: "test-secret".to_string(),
        legacy_api_key: Some(LEGACY_KEY.to_string()),
        ..ServerConfig::default()
    };
    let state = AppState::in_memory(&config);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = router(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), state)
}

fn transfer_to(port: u16) -> TransferConfig {
    TransferConfig {
        host: "127.0.0.1".to_string(),
        port,
        timeout_ms: 2000,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_send_uploads_slot_and_transfers_file() {
    let (url, state) = start_service().await;
    let inbox = TempDir::new().unwrap();
    let receiver = TransferReceiver::bind(
        "127.0.0.1:0",
        inbox.path(),
        1 << 20,
        Duration::from_secs(2),
    )
    .await
    .unwrap();
    let port = receiver.local_addr().unwrap().port();
    let stored = tokio::spawn(async move { receiver.accept_one().await });

    let root = TempDir::new().unwrap();
    let text = sine_recording();
    let path = write_recording(root.path(), SESSION, "OpenBCI-RAW-done.txt", &text);
    let mut config = client_config(&url, root.path());
    config.api_key = Some(LEGACY_KEY.to_string());
    config.transfer = transfer_to(port);

    let report = send_recording(&config, "42", &path).await.unwrap();
    assert_eq!(report.transferred_bytes, text.len() as u64);
    assert_eq!(report.uploaded_at.as_deref().map(str::len), Some(19));

    let stored = stored.await.unwrap().unwrap();
    assert!(stored.starts_with(inbox.path().join("42")));
    assert_eq!(std::fs::read_to_string(stored).unwrap(), text);

    let slot = state.slots.get("42").unwrap();
    assert!(!slot.payload.is_empty());
    assert!(state.queue.entries("42").await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failed_upload_still_transfers() {
    // Bind then drop to get a port nobody listens on.
    let dead_port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };
    let inbox = TempDir::new().unwrap();
    let receiver = TransferReceiver::bind(
        "127.0.0.1:0",
        inbox.path(),
        1 << 20,
        Duration::from_secs(2),
    )
    .await
    .unwrap();
    let port = receiver.local_addr().unwrap().port();
    let stored = tokio::spawn(async move { receiver.accept_one().await });

    let root = TempDir::new().unwrap();
    let path = write_recording(root.path(), SESSION, "OpenBCI-RAW-done.txt", &sine_recording());
    let mut config = client_config(&format!("http://127.0.0.1:{dead_port}"), root.path());
    config.legacy_upload_timeout_ms = 1000;
    config.transfer = transfer_to(port);

    let report = send_recording(&config, "42", &path).await.unwrap();
    assert!(report.uploaded_at.is_none());
    assert!(stored.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_failed_transfer_is_an_error() {
    let (url, _) = start_service().await;
    let dead_port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };
    let root = TempDir::new().unwrap();
    let path = write_recording(root.path(), SESSION, "OpenBCI-RAW-done.txt", &sine_recording());
    let mut config = client_config(&url, root.path());
    config.transfer = transfer_to(dead_port);

    assert!(send_recording(&config, "42", &path).await.is_err());
}

#[tokio::test]
async fn test_legacy_upload_sends_api_key_not_secret() {
    let (url, state) = start_service().await;
    let root = TempDir::new().unwrap();
    let path = write_recording(root.path(), SESSION, "OpenBCI-RAW-done.txt", &sine_recording());

    // Without its own api key the client is refused, even though it holds the secret.
    let config = client_config(&url, root.path());
    let client = WaveformClient::new(&config).unwrap();
    let snapshot = CapturePipeline::new(&config).unwrap().capture(&path).unwrap();
    assert!(client.upload_legacy(&snapshot, "42").await.is_err());
    assert!(state.slots.get("42").is_none());

    let mut config = client_config(&url, root.path());
    config.api_key = Some(LEGACY_KEY.to_string());
    let client = WaveformClient::new(&config).unwrap();
    assert!(client.upload_legacy(&snapshot, "42").await.is_ok());
    assert!(state.slots.get("42").is_some());
}

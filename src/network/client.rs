//! Signed HTTP calls to the ingestion service.

use crate::config::ClientConfig;
use crate::data::window::Snapshot;
use crate::error::{RelayError, RelayResult};
use crate::network::signing::{AuthHeaders, SignatureAlgorithm};
use crate::network::wire::{
    CleanRequest, CleanResponse, UploadRequest, UploadResponse, CLEAN_PATH, LEGACY_UPLOAD_PATH,
    REALTIME_UPLOAD_PATH,
};
use reqwest::{RequestBuilder, StatusCode};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};

/// Client for the upload and cleanup endpoints.
///
/// Each call carries fresh authentication headers and its own timeout; failures come
/// back as [`RelayError::Network`] and never panic.
#[derive(Debug, Clone)]
pub struct WaveformClient {
    http: reqwest::Client,
    base_url: String,
    secret: String,
    api_key: Option<String>,
    algorithm: SignatureAlgorithm,
    upload_timeout: Duration,
    cleanup_timeout: Duration,
    legacy_upload_timeout: Duration,
}

impl WaveformClient {
    /// Client for the service configured in `config`.
    pub fn new(config: &ClientConfig) -> RelayResult<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| RelayError::Network(format!("cannot build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.server_url.trim_end_matches('/').to_string(),
            secret: config.secret.clone(),
            api_key: config.api_key.clone(),
            algorithm: config.signature_algorithm,
            upload_timeout: Duration::from_millis(config.upload_timeout_ms),
            cleanup_timeout: Duration::from_millis(config.cleanup_timeout_ms),
            legacy_upload_timeout: Duration::from_millis(config.legacy_upload_timeout_ms),
        })
    }

    fn signed_post<B: Serialize>(&self, path: &str, body: &B, timeout: Duration) -> RequestBuilder {
        let headers = AuthHeaders::generate(&self.secret, self.algorithm);
        let mut request = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .timeout(timeout)
            .json(body);
        for (name, value) in headers.pairs() {
            request = request.header(name, value);
        }
        request
    }

    /// Pushes a snapshot onto the user's remote queue. Only HTTP 200 counts as success.
    pub async fn upload(&self, snapshot: &Snapshot, user_id: &str) -> RelayResult<()> {
        let body = UploadRequest {
            user_id: user_id.to_string(),
            waveform_data: snapshot.to_base64(),
            api_key: None,
        };
        let response = self
            .signed_post(REALTIME_UPLOAD_PATH, &body, self.upload_timeout)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            let text = response.text().await.unwrap_or_default();
            return Err(RelayError::Network(format!("upload rejected: {status} - {text}")));
        }
        debug!(user_id, bytes = snapshot.image_png.len(), "snapshot uploaded");
        Ok(())
    }

    /// Stores a snapshot in the user's single legacy slot. Returns the server timestamp.
    pub async fn upload_legacy(&self, snapshot: &Snapshot, user_id: &str) -> RelayResult<String> {
        let body = UploadRequest {
            user_id: user_id.to_string(),
            waveform_data: snapshot.to_base64(),
            api_key: self.api_key.clone(),
        };
        let response = self
            .signed_post(LEGACY_UPLOAD_PATH, &body, self.legacy_upload_timeout)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            let text = response.text().await.unwrap_or_default();
            return Err(RelayError::Network(format!(
                "legacy upload rejected: {status} - {text}"
            )));
        }
        let reply: UploadResponse = response.json().await?;
        Ok(reply.timestamp)
    }

    /// Deletes every queued snapshot of `user_id`. Returns how many were removed.
    pub async fn cleanup(&self, user_id: &str) -> RelayResult<u64> {
        let body = CleanRequest {
            user_id: user_id.to_string(),
        };
        let response = self
            .signed_post(CLEAN_PATH, &body, self.cleanup_timeout)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            let text = response.text().await.unwrap_or_default();
            return Err(RelayError::Network(format!("cleanup rejected: {status} - {text}")));
        }
        let reply: CleanResponse = response.json().await?;
        if !reply.success {
            return Err(RelayError::Network(format!("cleanup failed: {}", reply.message)));
        }
        info!(user_id, deleted = reply.deleted_count, "remote queue cleared");
        Ok(reply.deleted_count)
    }
}

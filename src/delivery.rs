//! One-shot delivery of a finished recording.

use crate::config::ClientConfig;
use crate::data::pipeline::CapturePipeline;
use crate::error::{RelayError, RelayResult};
use crate::network::client::WaveformClient;
use crate::network::transfer::transfer_file;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Outcome of [`send_recording`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Server timestamp of the legacy upload, if it succeeded
    pub uploaded_at: Option<String>,
    /// Raw bytes sent over the transfer channel
    pub transferred_bytes: u64,
}

/// Renders the trailing window of `path`, uploads it to the user's legacy slot and
/// then transfers the raw file.
///
/// A failed upload is logged and the transfer still runs; a failed transfer is an error.
pub async fn send_recording(
    config: &ClientConfig,
    user_id: &str,
    path: &Path,
) -> RelayResult<DeliveryReport> {
    let pipeline = CapturePipeline::new(config)?;
    let client = WaveformClient::new(config)?;

    let source: PathBuf = path.to_path_buf();
    let snapshot = tokio::task::spawn_blocking(move || pipeline.capture(&source))
        .await
        .map_err(|e| RelayError::Render(format!("capture task failed: {e}")))??;

    let uploaded_at = match client.upload_legacy(&snapshot, user_id).await {
        Ok(timestamp) => {
            info!(user_id, %timestamp, "snapshot stored in legacy slot");
            Some(timestamp)
        }
        Err(e) => {
            warn!(user_id, "legacy upload failed: {e}");
            None
        }
    };

    let transferred_bytes = transfer_file(path, user_id, &config.transfer).await?;
    Ok(DeliveryReport {
        uploaded_at,
        transferred_bytes,
    })
}

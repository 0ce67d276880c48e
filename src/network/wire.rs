//! JSON bodies and paths shared by the HTTP client and the ingestion service.

use serde::{Deserialize, Deserializer, Serialize};

/// Queue ingestion (signed).
pub const REALTIME_UPLOAD_PATH: &str = "/api/realtime-upload-waveform";
/// Bulk clear of a user's queue (signed).
pub const CLEAN_PATH: &str = "/api/clean-waveform";
/// Single-slot upload (signed).
pub const LEGACY_UPLOAD_PATH: &str = "/api/upload-waveform";
/// Destructive latest read from the queue.
pub const LATEST_PATH: &str = "/api/get-latest-waveform";
/// Non-destructive read of the single slot.
pub const LEGACY_GET_PATH: &str = "/api/get-waveform";
/// Liveness check.
pub const HEALTH_PATH: &str = "/health";

/// Timestamp layout used in every response.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Body of both upload endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadRequest {
    /// Owner of the snapshot
    #[serde(deserialize_with = "user_id_from_string_or_number")]
    pub user_id: String,
    /// Base64 PNG, optionally as a `data:image/...;base64,` URL
    #[serde(default)]
    pub waveform_data: String,
    /// Carried by the legacy upload only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

/// Body of the clean endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanRequest {
    /// User whose queue is cleared
    #[serde(deserialize_with = "user_id_from_string_or_number")]
    pub user_id: String,
}

/// Reply to a successful upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    /// Always true
    pub success: bool,
    /// Human readable outcome
    #[serde(default)]
    pub message: String,
    /// Server time of acceptance
    pub timestamp: String,
}

/// Reply to a clean request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanResponse {
    /// Whether the clear ran
    pub success: bool,
    /// Human readable outcome
    #[serde(default)]
    pub message: String,
    /// Entries removed
    #[serde(default)]
    pub deleted_count: u64,
}

/// Reply carrying a stored snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaveformResponse {
    /// Always true
    pub success: bool,
    /// Base64 PNG
    pub waveform_data: String,
    /// When the snapshot was stored
    pub created_at: String,
}

/// Error body for every failure status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Always false
    pub success: bool,
    /// What went wrong
    pub message: String,
}

/// Query string of the read endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserQuery {
    /// User to read for
    pub user_id: Option<String>,
}

/// Accepts `"42"` and `42` alike.
fn user_id_from_string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(i64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(text) => text.trim().to_string(),
        Raw::Number(number) => number.to_string(),
    })
}

/// Drops a `data:image/...;base64,` prefix if present.
pub fn strip_data_url(payload: &str) -> &str {
    if payload.starts_with("data:image") {
        payload.split_once(',').map_or("", |(_, data)| data)
    } else {
        payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_id_accepts_number_and_string() {
        let numeric: CleanRequest = serde_json::from_str(r#"{"user_id": 42}"#).unwrap();
        let text: CleanRequest = serde_json::from_str(r#"{"user_id": " 42 "}"#).unwrap();
        assert_eq!(numeric.user_id, "42");
        assert_eq!(text.user_id, "42");
    }

    #[test]
    fn test_upload_request_api_key_optional() {
        let body: UploadRequest =
            serde_json::from_str(r#"{"user_id": "7", "waveform_data": "AAAA"}"#).unwrap();
        assert!(body.api_key.is_none());
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("api_key").is_none());
    }

    #[test]
    fn test_strip_data_url() {
        assert_eq!(strip_data_url("data:image/png;base64,QUJD"), "QUJD");
        assert_eq!(strip_data_url("QUJD"), "QUJD");
        assert_eq!(strip_data_url("data:image/png"), "");
    }
}

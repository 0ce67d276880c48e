//! Request handlers. Signed endpoints authenticate before the body is even parsed, so a
//! rejected request never mutates state.

use super::error::ApiError;
use super::AppState;
use crate::error::ProtocolError;
use crate::network::signing::{constant_time_eq, NONCE_HEADER, SIGNATURE_HEADER, TIMESTAMP_HEADER};
use crate::network::wire::{
    strip_data_url, CleanRequest, CleanResponse, UploadRequest, UploadResponse, UserQuery,
    WaveformResponse, TIMESTAMP_FORMAT,
};
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::info;

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    state.verifier.verify(
        header(headers, SIGNATURE_HEADER),
        header(headers, TIMESTAMP_HEADER),
        header(headers, NONCE_HEADER),
    )?;
    Ok(())
}

fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(format!("Invalid JSON body: {e}")))
}

fn required_user(user_id: &str) -> Result<&str, ApiError> {
    if user_id.is_empty() {
        Err(ApiError::BadRequest("Missing user_id".into()))
    } else {
        Ok(user_id)
    }
}

struct UploadFields {
    user_id: String,
    payload: String,
    api_key: Option<String>,
}

/// Validates an upload body, removing any data-URL prefix from the payload.
fn upload_fields(body: &Bytes) -> Result<UploadFields, ApiError> {
    let request: UploadRequest = parse_body(body)?;
    required_user(&request.user_id)?;
    let payload = strip_data_url(request.waveform_data.trim());
    if payload.is_empty() {
        return Err(ApiError::BadRequest("Missing waveform_data".into()));
    }
    Ok(UploadFields {
        payload: payload.to_string(),
        user_id: request.user_id,
        api_key: request.api_key,
    })
}

fn check_api_key(state: &AppState, presented: Option<&str>) -> Result<(), ApiError> {
    let Some(expected) = state.legacy_api_key.as_deref() else {
        return Ok(());
    };
    match presented {
        Some(key) if constant_time_eq(key.as_bytes(), expected.as_bytes()) => Ok(()),
        _ => Err(ProtocolError::InvalidApiKey.into()),
    }
}

fn format_time(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

fn query_user(query: &UserQuery) -> Result<&str, ApiError> {
    required_user(query.user_id.as_deref().map(str::trim).unwrap_or_default())
}

/// Liveness check.
pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// Signed append to the user's realtime queue.
pub async fn realtime_upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<UploadResponse>, ApiError> {
    authorize(&state, &headers)?;
    let UploadFields {
        user_id, payload, ..
    } = upload_fields(&body)?;

    let entry = state.queue.ingest(&user_id, payload).await?;
    info!(user_id, sequence_id = entry.sequence_id, "snapshot added to queue");

    Ok(Json(UploadResponse {
        success: true,
        message: "Waveform queued".into(),
        timestamp: format_time(entry.created_at),
    }))
}

/// Signed removal of every queued entry for a user.
pub async fn clean(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<CleanResponse>, ApiError> {
    authorize(&state, &headers)?;
    let request: CleanRequest = parse_body(&body)?;
    let user_id = required_user(&request.user_id)?;

    let deleted = state.queue.bulk_clear(user_id).await?;
    info!(user_id, deleted, "queue cleared");

    Ok(Json(CleanResponse {
        success: true,
        message: format!("Deleted {deleted} waveform(s)"),
        deleted_count: deleted as u64,
    }))
}

/// Legacy upload: replaces the user's single slot.
pub async fn legacy_upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<UploadResponse>, ApiError> {
    authorize(&state, &headers)?;
    let UploadFields {
        user_id,
        payload,
        api_key,
    } = upload_fields(&body)?;
    check_api_key(&state, api_key.as_deref())?;

    let entry = state.slots.put(&user_id, payload);
    info!(user_id, "legacy snapshot stored");

    Ok(Json(UploadResponse {
        success: true,
        message: "Waveform stored".into(),
        timestamp: format_time(entry.created_at),
    }))
}

/// Newest queued entry; older ones are pruned.
pub async fn latest(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<UserQuery>,
) -> Result<Json<WaveformResponse>, ApiError> {
    if state.require_signed_reads {
        authorize(&state, &headers)?;
    }
    let user_id = query_user(&query)?;

    let entry = state
        .queue
        .read_latest_and_prune(user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("No waveform queued for user {user_id}")))?;

    Ok(Json(WaveformResponse {
        success: true,
        waveform_data: entry.payload,
        created_at: format_time(entry.created_at),
    }))
}

/// Legacy read of the user's single slot.
pub async fn legacy_get(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<UserQuery>,
) -> Result<Json<WaveformResponse>, ApiError> {
    if state.require_signed_reads {
        authorize(&state, &headers)?;
    }
    let user_id = query_user(&query)?;

    let entry = state
        .slots
        .get(user_id)
        .ok_or_else(|| ApiError::NotFound(format!("No waveform stored for user {user_id}")))?;

    Ok(Json(WaveformResponse {
        success: true,
        waveform_data: entry.payload,
        created_at: format_time(entry.created_at),
    }))
}

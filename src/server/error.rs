//! Mapping of failures to HTTP responses.

use crate::error::{ProtocolError, RelayError};
use crate::network::wire::ErrorResponse;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::{error, warn};

/// A failed request, rendered as `{success: false, message}`.
#[derive(Debug)]
pub enum ApiError {
    /// Authentication rejected before any state was touched
    Auth(ProtocolError),
    /// Body or query missing a required value, or not JSON
    BadRequest(String),
    /// Nothing stored for the requested user
    NotFound(String),
    /// Storage failure; logged, reported as 500
    Internal(RelayError),
}

impl ApiError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Auth(e) if e.is_malformed() => StatusCode::UNAUTHORIZED,
            ApiError::Auth(_) => StatusCode::FORBIDDEN,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::Auth(e) if e.is_malformed() => "Missing authentication parameters".into(),
            ApiError::Auth(ProtocolError::SignatureMismatch) => "Invalid signature".into(),
            ApiError::Auth(ProtocolError::InvalidApiKey) => "Invalid API key".into(),
            ApiError::Auth(e) => e.to_string(),
            ApiError::BadRequest(message) | ApiError::NotFound(message) => message.clone(),
            ApiError::Internal(_) => "Internal server error".into(),
        }
    }
}

impl From<ProtocolError> for ApiError {
    fn from(e: ProtocolError) -> Self {
        ApiError::Auth(e)
    }
}

impl From<RelayError> for ApiError {
    fn from(e: RelayError) -> Self {
        match e {
            RelayError::Protocol(protocol) => ApiError::Auth(protocol),
            other => ApiError::Internal(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            ApiError::Auth(e) => warn!(%status, "request rejected: {e}"),
            ApiError::Internal(e) => error!(%status, "request failed: {e}"),
            _ => {}
        }
        let body = ErrorResponse {
            success: false,
            message: self.message(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::Auth(ProtocolError::MissingParameter("Nonce")).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::Auth(ProtocolError::SignatureMismatch).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::Auth(ProtocolError::ReplayedNonce("1".into())).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::from(RelayError::QueueCapacityRace {
                user_id: "u".into(),
                attempts: 5
            })
            .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}

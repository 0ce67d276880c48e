//! Custom error types for the application.
//!
//! This module defines the primary error type, `RelayError`, shared by the acquisition
//! pipeline, the delivery clients and the ingestion service. Using the `thiserror` crate,
//! it provides a centralized and consistent way to handle the failure modes of every stage.
//!
//! ## Error Hierarchy
//!
//! - **`SourceNotFound`**: No session directory or data file matched under the recordings
//!   root. Fatal to a monitor worker at loop entry.
//! - **`Read`** / **`Filter`** / **`Render`**: Per-tick pipeline failures. The polling loop
//!   logs them and moves on to the next tick.
//! - **`Network`**: Timeouts, refused connections and non-200 responses from the remote
//!   service. Also per-tick.
//! - **`Protocol`**: A signed envelope failed validation. Wraps [`ProtocolError`].
//! - **`QueueCapacityRace`**: Concurrent sequence assignment kept conflicting until the
//!   retry budget was exhausted.
//! - **`Config`** / **`Configuration`**: Parse errors from `figment` and semantic
//!   validation errors respectively.
//!
//! By using `#[from]`, `RelayError` can be created from underlying error types,
//! simplifying error handling throughout the crate with the `?` operator.

use std::path::PathBuf;
use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type RelayResult<T> = std::result::Result<T, RelayError>;

/// Errors raised anywhere in the acquisition, delivery or ingestion paths.
#[derive(Error, Debug)]
pub enum RelayError {
    /// No matching session directory or data file.
    #[error("No data source found under {}: {reason}", root.display())]
    SourceNotFound {
        /// Directory that was scanned.
        root: PathBuf,
        /// What was missing.
        reason: String,
    },

    /// The sample file could not be parsed.
    #[error("Read error: {0}")]
    Read(String),

    /// The filter could not run on the given window.
    #[error("Filter error: {0}")]
    Filter(String),

    /// The snapshot could not be rendered or encoded.
    #[error("Render error: {0}")]
    Render(String),

    /// Timeout, refused connection or unexpected HTTP status.
    #[error("Network error: {0}")]
    Network(String),

    /// Raw transfer channel failure.
    #[error("Transfer error: {0}")]
    Transfer(String),

    /// Bad or missing request signature.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Sequence assignment kept conflicting with concurrent ingests.
    #[error("Sequence assignment for user {user_id} still conflicting after {attempts} attempts")]
    QueueCapacityRace {
        /// User whose queue was contended.
        user_id: String,
        /// Attempts made before giving up.
        attempts: u32,
    },

    /// The backing store refused an operation for a reason other than a conflict.
    #[error("Store error: {0}")]
    Store(String),

    /// Configuration file or environment could not be parsed.
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// Configuration parsed but is semantically invalid.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// Local file or socket I/O.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for RelayError {
    fn from(value: figment::Error) -> Self {
        RelayError::Config(Box::new(value))
    }
}

impl From<reqwest::Error> for RelayError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_timeout() {
            RelayError::Network(format!("request timed out: {value}"))
        } else if value.is_connect() {
            RelayError::Network(format!("connection failed: {value}"))
        } else {
            RelayError::Network(value.to_string())
        }
    }
}

impl RelayError {
    /// Whether a polling loop may log this error and continue with the next tick.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            RelayError::SourceNotFound { .. }
                | RelayError::Config(_)
                | RelayError::Configuration(_)
        )
    }
}

/// Reasons a signed envelope is rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// A required authentication header was absent or empty.
    #[error("Missing authentication parameter: {0}")]
    MissingParameter(&'static str),

    /// Recomputed signature does not match the one presented.
    #[error("Invalid signature")]
    SignatureMismatch,

    /// Timestamp header is not a unix timestamp in seconds.
    #[error("Malformed timestamp: {0}")]
    MalformedTimestamp(String),

    /// Timestamp is outside the accepted skew window.
    #[error("Timestamp {timestamp} outside the {window_secs}s acceptance window")]
    StaleTimestamp {
        /// Timestamp presented by the caller.
        timestamp: i64,
        /// Accepted skew in seconds.
        window_secs: u64,
    },

    /// Nonce was already used inside the acceptance window.
    #[error("Nonce already used: {0}")]
    ReplayedNonce(String),

    /// Legacy upload carried no `api_key`, or the wrong one.
    #[error("Invalid API key")]
    InvalidApiKey,
}

impl ProtocolError {
    /// Missing parameters are malformed requests; everything else is a failed proof.
    pub fn is_malformed(&self) -> bool {
        matches!(self, ProtocolError::MissingParameter(_))
    }
}

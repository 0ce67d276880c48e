//! Configuration System using Figment
//!
//! This module provides strongly-typed configuration loading for both halves of the
//! relay: the acquisition client and the ingestion server. Configuration is layered:
//! 1. Built-in defaults (see the `Default` impls below)
//! 2. A TOML file (default `config/eeg_relay.toml`, missing file is not an error)
//! 3. Environment variables prefixed with `EEG_RELAY_`, nested keys split on `__`
//!
//! Every value that the pipeline depends on lives here and is passed in at construction,
//! so several monitors with different settings can run side by side.
//!
//! # Example
//! ```no_run
//! use eeg_relay::config::RelayConfig;
//!
//! let config = RelayConfig::load()?;
//! config.validate()?;
//! println!("Uploading to {}", config.client.server_url);
//! # Ok::<(), eeg_relay::error::RelayError>(())
//! ```

use crate::data::iir_filter::ZeroPhaseLowpass;
use crate::error::{RelayError, RelayResult};
use crate::logging::OutputFormat;
use crate::network::signing::SignatureAlgorithm;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file location, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/eeg_relay.toml";

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "EEG_RELAY_";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: LogLevel,
    /// Log output format (pretty, compact, json)
    pub log_format: OutputFormat,
    /// Acquisition and delivery client settings
    pub client: ClientConfig,
    /// Ingestion service settings
    pub server: ServerConfig,
}

/// Logging level wrapper so defaults survive partial files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogLevel(pub String);

impl Default for LogLevel {
    fn default() -> Self {
        Self("info".to_string())
    }
}

impl LogLevel {
    /// The level as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Client-side settings: where to read samples from and where to send them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base address of the ingestion service, e.g. `https://example.org`
    pub server_url: String,
    /// Shared signing secret
    pub secret: String,
    /// Digest used for request signatures
    pub signature_algorithm: SignatureAlgorithm,
    /// Credential sent as `api_key` with legacy uploads; independent of `secret`
    pub api_key: Option<String>,
    /// Root directory that holds recording session directories
    pub recordings_dir: PathBuf,
    /// Name prefix of session directories
    pub session_prefix: String,
    /// Name prefix of data files inside a session
    pub file_prefix: String,
    /// Name suffix of data files inside a session
    pub file_suffix: String,
    /// Substring identifying EEG columns in the header row
    pub channel_tag: String,
    /// Sampling and filter parameters
    pub acquisition: AcquisitionConfig,
    /// Snapshot canvas size
    pub render: RenderConfig,
    /// Poll cadence in milliseconds
    pub poll_interval_ms: u64,
    /// Realtime upload timeout in milliseconds
    pub upload_timeout_ms: u64,
    /// Cleanup request timeout in milliseconds
    pub cleanup_timeout_ms: u64,
    /// Legacy single-slot upload timeout in milliseconds
    pub legacy_upload_timeout_ms: u64,
    /// How long `stop()` waits for the worker to finish, in milliseconds
    pub join_timeout_ms: u64,
    /// Raw transfer channel target
    pub transfer: TransferConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8080".to_string(),
            secret: String::new(),
            signature_algorithm: SignatureAlgorithm::default(),
            api_key: None,
            recordings_dir: PathBuf::from("Recordings"),
            session_prefix: "OpenBCISession_".to_string(),
            file_prefix: "OpenBCI-RAW-".to_string(),
            file_suffix: ".txt".to_string(),
            channel_tag: "EXG Channel".to_string(),
            acquisition: AcquisitionConfig::default(),
            render: RenderConfig::default(),
            poll_interval_ms: 5000,
            upload_timeout_ms: 5000,
            cleanup_timeout_ms: 5000,
            legacy_upload_timeout_ms: 20_000,
            join_timeout_ms: 2000,
            transfer: TransferConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Poll cadence.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Bounded wait applied when joining the worker.
    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }
}

/// Sampling and filter parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Nominal sample rate in Hz
    pub sample_rate_hz: f64,
    /// Window duration in seconds
    pub window_secs: f64,
    /// Low-pass cutoff in Hz
    pub cutoff_hz: f64,
    /// Butterworth order (even)
    pub filter_order: usize,
    /// Leading filtered samples discarded while the filter settles
    pub warmup_samples: usize,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: 250.0,
            window_secs: 5.0,
            cutoff_hz: 50.0,
            filter_order: 4,
            warmup_samples: 30,
        }
    }
}

impl AcquisitionConfig {
    /// Number of samples per window.
    pub fn window_len(&self) -> usize {
        (self.sample_rate_hz * self.window_secs).round().max(0.0) as usize
    }
}

/// Snapshot canvas size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Canvas width
    pub width: u32,
    /// Canvas height
    pub height: u32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: 1500,
            height: 1800,
        }
    }
}

/// Raw transfer channel target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Receiver host
    pub host: String,
    /// Receiver port
    pub port: u16,
    /// Connect and write timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            timeout_ms: 10_000,
        }
    }
}

impl TransferConfig {
    /// `host:port` form of the target.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Connect and write timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Ingestion service settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// HTTP listen address
    pub bind_addr: String,
    /// Shared signing secret
    pub secret: String,
    /// Digest used for request signatures
    pub signature_algorithm: SignatureAlgorithm,
    /// Live entries kept per user
    pub queue_capacity: usize,
    /// Accepted timestamp skew and nonce memory, in seconds (0 disables)
    pub replay_window_secs: u64,
    /// Sequence assignment attempts before giving up
    pub max_ingest_retries: u32,
    /// Raw transfer listen address
    pub transfer_bind_addr: String,
    /// Directory receiving transferred files
    pub transfer_inbox: PathBuf,
    /// Largest accepted transfer payload in bytes
    pub max_transfer_bytes: u64,
    /// Per-read timeout on the transfer channel, in milliseconds
    pub transfer_read_timeout_ms: u64,
    /// Also require signed headers on the two GET endpoints
    pub require_signed_reads: bool,
    /// When set, legacy uploads must carry this `api_key`
    pub legacy_api_key: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            secret: String::new(),
            signature_algorithm: SignatureAlgorithm::default(),
            queue_capacity: 10,
            replay_window_secs: 300,
            max_ingest_retries: 5,
            transfer_bind_addr: "0.0.0.0:5000".to_string(),
            transfer_inbox: PathBuf::from("data/inbox"),
            max_transfer_bytes: 256 * 1024 * 1024,
            transfer_read_timeout_ms: 10_000,
            require_signed_reads: false,
            legacy_api_key: None,
        }
    }
}

impl RelayConfig {
    /// Load configuration from the default file and environment variables
    ///
    /// Environment variables can override configuration with prefix `EEG_RELAY_`
    /// Example: `EEG_RELAY_SERVER__QUEUE_CAPACITY=20`
    pub fn load() -> RelayResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    pub fn load_from<P: AsRef<Path>>(path: P) -> RelayResult<Self> {
        Ok(Self::figment(path.as_ref()).extract()?)
    }

    fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(RelayConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> RelayResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.as_str().to_lowercase().as_str()) {
            return Err(RelayError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.log_level.as_str(),
                valid_levels.join(", ")
            )));
        }
        self.client.validate()?;
        self.server.validate()
    }
}

impl ClientConfig {
    /// Semantic checks for the client half.
    pub fn validate(&self) -> RelayResult<()> {
        if self.secret.is_empty() {
            return Err(RelayError::Configuration(
                "client.secret must not be empty".to_string(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(RelayError::Configuration(
                "client.poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.render.width == 0 || self.render.height == 0 {
            return Err(RelayError::Configuration(
                "client.render dimensions must be non-zero".to_string(),
            ));
        }
        self.acquisition.validate()
    }
}

impl AcquisitionConfig {
    /// Checks the filter can be designed and the window survives padding and warm-up.
    pub fn validate(&self) -> RelayResult<()> {
        if !(self.sample_rate_hz > 0.0) {
            return Err(RelayError::Configuration(format!(
                "sample_rate_hz must be positive, got {}",
                self.sample_rate_hz
            )));
        }
        let nyquist = self.sample_rate_hz / 2.0;
        if !(self.cutoff_hz > 0.0 && self.cutoff_hz < nyquist) {
            return Err(RelayError::Configuration(format!(
                "cutoff_hz {} must lie in (0, {})",
                self.cutoff_hz, nyquist
            )));
        }
        if self.filter_order < 2 || self.filter_order % 2 != 0 {
            return Err(RelayError::Configuration(format!(
                "filter_order must be an even number >= 2, got {}",
                self.filter_order
            )));
        }
        let minimum = ZeroPhaseLowpass::padding_len(self.filter_order).max(self.warmup_samples);
        if self.window_len() <= minimum {
            return Err(RelayError::Configuration(format!(
                "window of {} samples is too short; need more than {}",
                self.window_len(),
                minimum
            )));
        }
        Ok(())
    }
}

impl ServerConfig {
    /// Semantic checks for the server half.
    pub fn validate(&self) -> RelayResult<()> {
        if self.secret.is_empty() {
            return Err(RelayError::Configuration(
                "server.secret must not be empty".to_string(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(RelayError::Configuration(
                "server.queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.max_ingest_retries == 0 {
            return Err(RelayError::Configuration(
                "server.max_ingest_retries must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Read timeout on the transfer channel.
    pub fn transfer_read_timeout(&self) -> Duration {
        Duration::from_millis(self.transfer_read_timeout_ms)
    }
}

//! # EEG Relay Core Library
//!
//! This crate moves multi-channel EEG recordings from an acquisition machine to a remote
//! service. On the client side a monitor periodically reads the newest recording, filters
//! it, renders a snapshot and uploads it with a signed request. On the server side an
//! ingestion service verifies those requests and keeps a small bounded history of
//! snapshots per user. A separate raw TCP channel carries whole recordings.
//!
//! ## Crate Structure
//!
//! - **`config`**: Figment-based configuration for both halves (TOML file plus
//!   `EEG_RELAY_` environment overrides), with semantic validation.
//! - **`data`**: Source discovery, windowing, NaN repair, the zero-phase low-pass filter,
//!   the renderer and the `CapturePipeline` that chains them.
//! - **`delivery`**: One-shot upload and transfer of a finished recording.
//! - **`error`**: The `RelayError` and `ProtocolError` enums.
//! - **`logging`**: `tracing-subscriber` setup.
//! - **`monitor`**: The fixed-cadence scheduler with its start/stop lifecycle.
//! - **`network`**: Request signing, the HTTP client, the JSON wire types and the raw
//!   transfer framing.
//! - **`queue`**: The bounded per-user queue and the store contract behind it.
//! - **`server`**: The axum ingestion service.
//! - **`sink`**: Where a monitor reports log lines and status changes.

pub mod config;
pub mod data;
pub mod delivery;
pub mod error;
pub mod logging;
pub mod monitor;
pub mod network;
pub mod queue;
pub mod server;
pub mod sink;

pub use config::RelayConfig;
pub use error::{RelayError, RelayResult};
pub use monitor::{Monitor, MonitorState};
pub use sink::{LogBuffer, MonitorSink, MonitorStatus, TracingSink};

//! HTTP ingestion service.

pub mod error;
mod handlers;

use crate::config::ServerConfig;
use crate::error::RelayResult;
use crate::network::signing::SignatureVerifier;
use crate::network::wire::{
    CLEAN_PATH, HEALTH_PATH, LATEST_PATH, LEGACY_GET_PATH, LEGACY_UPLOAD_PATH,
    REALTIME_UPLOAD_PATH,
};
use crate::queue::{BoundedQueue, InMemoryStore, SnapshotSlots, WaveformStore};
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

pub use error::ApiError;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    /// Realtime per-user queue
    pub queue: BoundedQueue,
    /// Legacy single-slot store
    pub slots: Arc<SnapshotSlots>,
    /// Checks signed requests, with replay protection when enabled
    pub verifier: Arc<SignatureVerifier>,
    /// Whether `GET /latest` must carry a valid signature
    pub require_signed_reads: bool,
    /// Key legacy uploads must present; `None` disables the check
    pub legacy_api_key: Option<String>,
}

impl AppState {
    /// State over the given store, configured from `config`.
    pub fn new(config: &ServerConfig, store: Arc<dyn WaveformStore>) -> Self {
        let verifier = SignatureVerifier::new(config.secret.clone(), config.signature_algorithm)
            .with_replay_window(config.replay_window_secs);
        Self {
            queue: BoundedQueue::new(store, config.queue_capacity, config.max_ingest_retries),
            slots: Arc::new(SnapshotSlots::new()),
            verifier: Arc::new(verifier),
            require_signed_reads: config.require_signed_reads,
            legacy_api_key: config.legacy_api_key.clone(),
        }
    }

    /// State over a fresh in-memory store.
    pub fn in_memory(config: &ServerConfig) -> Self {
        Self::new(config, Arc::new(InMemoryStore::new()))
    }
}

/// All ingestion routes bound to `state`.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(HEALTH_PATH, get(handlers::health))
        .route(REALTIME_UPLOAD_PATH, post(handlers::realtime_upload))
        .route(CLEAN_PATH, post(handlers::clean))
        .route(LEGACY_UPLOAD_PATH, post(handlers::legacy_upload))
        .route(LATEST_PATH, get(handlers::latest))
        .route(LEGACY_GET_PATH, get(handlers::legacy_get))
        .with_state(state)
}

/// Binds `config.bind_addr` and serves until the task is dropped.
pub async fn serve(config: &ServerConfig) -> RelayResult<()> {
    let listener = TcpListener::bind(&config.bind_addr).await?;
    info!("Ingestion service listening on {}", listener.local_addr()?);
    axum::serve(listener, router(AppState::in_memory(config))).await?;
    Ok(())
}

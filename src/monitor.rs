//! Fixed-cadence monitor: the start/stop lifecycle around one polling worker.
//!
//! `start()` clears the user's remote queue (best effort), then spawns a worker that
//! resolves the newest data file once and, every poll interval, captures a snapshot and
//! uploads it. Per-tick failures are reported through the [`MonitorSink`] and the loop
//! carries on. The source is not re-resolved while the worker runs, so a new session
//! directory is only picked up by the next `start()`.
//!
//! The worker and its owner share nothing but an atomic running flag and the sink.
//! Each `start()` creates a fresh flag, so a worker that outlived its join timeout can
//! never be revived by a later start.

use crate::config::ClientConfig;
use crate::data::pipeline::CapturePipeline;
use crate::data::source::locate_latest_source;
use crate::error::{RelayError, RelayResult};
use crate::network::client::WaveformClient;
use crate::sink::{MonitorSink, MonitorStatus};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::Level;

/// Longest single sleep between checks of the running flag.
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Observable lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    /// No worker, or the worker has exited
    Stopped,
    /// A worker is polling
    Running,
}

/// One user's acquisition-and-upload scheduler.
pub struct Monitor {
    user_id: String,
    config: Arc<ClientConfig>,
    client: Arc<WaveformClient>,
    pipeline: Arc<CapturePipeline>,
    sink: Arc<dyn MonitorSink>,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl Monitor {
    /// Builds the pipeline and HTTP client for `user_id`. Nothing runs until `start()`.
    pub fn new(
        user_id: impl Into<String>,
        config: ClientConfig,
        sink: Arc<dyn MonitorSink>,
    ) -> RelayResult<Self> {
        let pipeline = CapturePipeline::new(&config)?;
        let client = WaveformClient::new(&config)?;

        Ok(Self {
            user_id: user_id.into(),
            config: Arc::new(config),
            client: Arc::new(client),
            pipeline: Arc::new(pipeline),
            sink,
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
        })
    }

    /// User this monitor uploads for.
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// `Running` until `stop()` or until the worker gave up on its own.
    pub fn state(&self) -> MonitorState {
        if self.running.load(Ordering::Acquire) {
            MonitorState::Running
        } else {
            MonitorState::Stopped
        }
    }

    /// Clears the remote queue, then spawns the polling worker and returns.
    ///
    /// A no-op (with a log notice) while already running. A failed cleanup is logged
    /// and does not prevent the start.
    pub async fn start(&mut self) {
        if self.state() == MonitorState::Running {
            self.sink.log(Level::INFO, "monitor already running; start ignored");
            return;
        }

        match self.client.cleanup(&self.user_id).await {
            Ok(deleted) => self.sink.log(
                Level::INFO,
                &format!("cleared {deleted} queued snapshot(s) before start"),
            ),
            Err(e) => self
                .sink
                .log(Level::WARN, &format!("cleanup before start failed: {e}")),
        }

        let running = Arc::new(AtomicBool::new(true));
        self.running = running.clone();
        self.sink.status(MonitorStatus::Running);

        let worker = Worker {
            user_id: self.user_id.clone(),
            recordings_dir: self.config.recordings_dir.clone(),
            interval: self.config.poll_interval(),
            client: self.client.clone(),
            pipeline: self.pipeline.clone(),
            sink: self.sink.clone(),
            running,
        };
        self.worker = Some(tokio::spawn(worker.run()));
    }

    /// Signals the worker and waits for it up to the join timeout.
    ///
    /// Safe to call at any time and more than once. An in-flight upload is not
    /// cancelled; if the worker does not finish in time it is detached and the monitor
    /// reports `Stopped` anyway.
    pub async fn stop(&mut self) {
        let was_running = self.running.swap(false, Ordering::AcqRel);

        if let Some(handle) = self.worker.take() {
            let join_timeout = self.config.join_timeout();
            match tokio::time::timeout(join_timeout, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => self
                    .sink
                    .log(Level::ERROR, &format!("monitor worker failed: {e}")),
                Err(_) => self.sink.log(
                    Level::WARN,
                    &format!("worker did not finish within {join_timeout:?}; detached"),
                ),
            }
        }

        if was_running {
            self.sink.status(MonitorStatus::Stopped);
        }
    }

    /// Bulk-clears the user's remote queue without touching the worker.
    pub async fn cleanup(&self) -> RelayResult<u64> {
        self.client.cleanup(&self.user_id).await
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

struct Worker {
    user_id: String,
    recordings_dir: PathBuf,
    interval: Duration,
    client: Arc<WaveformClient>,
    pipeline: Arc<CapturePipeline>,
    sink: Arc<dyn MonitorSink>,
    running: Arc<AtomicBool>,
}

impl Worker {
    async fn run(self) {
        if let Some(source) = self.resolve_source().await {
            self.sink
                .log(Level::INFO, &format!("reading from {}", source.display()));
            self.poll(source).await;
        }

        // Whoever flips the flag reports the stop; here only when the worker quit alone.
        if self.running.swap(false, Ordering::AcqRel) {
            self.sink.status(MonitorStatus::Stopped);
        }
    }

    async fn resolve_source(&self) -> Option<PathBuf> {
        let pipeline = self.pipeline.clone();
        let root = self.recordings_dir.clone();
        let located =
            tokio::task::spawn_blocking(move || locate_latest_source(&root, pipeline.layout()))
                .await;

        match located {
            Ok(Ok(path)) => Some(path),
            Ok(Err(e @ RelayError::SourceNotFound { .. })) => {
                self.sink.log(Level::ERROR, &e.to_string());
                self.sink.status(MonitorStatus::SourceMissing);
                None
            }
            Ok(Err(e)) => {
                self.sink
                    .log(Level::ERROR, &format!("cannot resolve data source: {e}"));
                None
            }
            Err(e) => {
                self.sink
                    .log(Level::ERROR, &format!("source lookup task failed: {e}"));
                None
            }
        }
    }

    async fn poll(&self, source: PathBuf) {
        while self.running.load(Ordering::Acquire) {
            let started = Instant::now();

            if !self.tick(&source).await {
                break;
            }

            let elapsed = started.elapsed();
            self.sink.log(
                Level::DEBUG,
                &format!("tick processed in {} ms", elapsed.as_millis()),
            );
            self.sleep_while_running(self.interval.saturating_sub(elapsed))
                .await;
        }
    }

    /// One capture and upload. Returns false when the worker should end.
    async fn tick(&self, source: &std::path::Path) -> bool {
        let pipeline = self.pipeline.clone();
        let path = source.to_path_buf();
        let captured = tokio::task::spawn_blocking(move || pipeline.capture(&path)).await;

        let snapshot = match captured {
            Ok(Ok(snapshot)) => snapshot,
            Ok(Err(e)) if e.is_recoverable() => {
                self.sink
                    .log(Level::WARN, &format!("capture skipped: {e}"));
                return true;
            }
            Ok(Err(e)) => {
                self.sink.log(Level::ERROR, &format!("capture failed: {e}"));
                return false;
            }
            Err(e) => {
                self.sink
                    .log(Level::ERROR, &format!("capture task failed: {e}"));
                return true;
            }
        };

        match self.client.upload(&snapshot, &self.user_id).await {
            Ok(()) => self.sink.log(
                Level::INFO,
                &format!("snapshot uploaded ({} bytes)", snapshot.image_png.len()),
            ),
            Err(e) => self.sink.log(Level::WARN, &format!("upload failed: {e}")),
        }
        true
    }

    async fn sleep_while_running(&self, mut remaining: Duration) {
        while !remaining.is_zero() && self.running.load(Ordering::Acquire) {
            let step = remaining.min(STOP_POLL_INTERVAL);
            tokio::time::sleep(step).await;
            remaining = remaining.saturating_sub(step);
        }
    }
}

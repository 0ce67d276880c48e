//! Read → filter → render, as one synchronous capture step.

use crate::config::ClientConfig;
use crate::data::iir_filter::{apply_filter, LowpassConfig, ZeroPhaseLowpass};
use crate::data::render::WaveformRenderer;
use crate::data::source::{read_window, SourceLayout};
use crate::data::window::{FilteredWindow, Snapshot};
use crate::error::RelayResult;
use std::path::Path;

/// Everything needed to turn a data file into a [`Snapshot`].
///
/// Built once per monitor from its [`ClientConfig`]; capture is CPU and file bound, so
/// async callers run it on the blocking pool.
#[derive(Debug, Clone)]
pub struct CapturePipeline {
    window_len: usize,
    warmup: usize,
    channel_tag: String,
    filter: ZeroPhaseLowpass,
    renderer: WaveformRenderer,
    layout: SourceLayout,
}

impl CapturePipeline {
    /// Designs the filter and renderer described by `config`.
    pub fn new(config: &ClientConfig) -> RelayResult<Self> {
        let acquisition = &config.acquisition;
        let filter = ZeroPhaseLowpass::new(LowpassConfig {
            cutoff_hz: acquisition.cutoff_hz,
            sample_rate_hz: acquisition.sample_rate_hz,
            order: acquisition.filter_order,
        })?;

        Ok(Self {
            window_len: acquisition.window_len(),
            warmup: acquisition.warmup_samples,
            channel_tag: config.channel_tag.clone(),
            filter,
            renderer: WaveformRenderer::new(config.render, acquisition.sample_rate_hz),
            layout: SourceLayout {
                session_prefix: config.session_prefix.clone(),
                file_prefix: config.file_prefix.clone(),
                file_suffix: config.file_suffix.clone(),
            },
        })
    }

    /// Naming rules used to locate sources.
    pub fn layout(&self) -> &SourceLayout {
        &self.layout
    }

    /// Reads and filters the trailing window of `path`.
    pub fn filtered_window(&self, path: &Path) -> RelayResult<FilteredWindow> {
        let window = read_window(path, self.window_len, &self.channel_tag)?;
        apply_filter(&window, &self.filter, self.warmup)
    }

    /// Full capture: read, filter and render.
    pub fn capture(&self, path: &Path) -> RelayResult<Snapshot> {
        let filtered = self.filtered_window(path)?;
        self.renderer.render(&filtered)
    }
}

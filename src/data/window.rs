//! Fixed-length multi-channel sample windows and the snapshot rendered from them.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};

/// Number of EEG channels carried by every window.
pub const CHANNEL_COUNT: usize = 8;

/// One sample across all channels, in physical units (µV).
pub type Sample = [f64; CHANNEL_COUNT];

/// Raw trailing window read from a data file, after pad/trim and missing-value repair.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleWindow {
    samples: Vec<Sample>,
}

impl SampleWindow {
    /// Wraps row-major samples.
    pub fn new(samples: Vec<Sample>) -> Self {
        Self { samples }
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// True when the window has no rows.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Row-major view.
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Copy of a single channel.
    pub fn channel(&self, index: usize) -> Vec<f64> {
        self.samples.iter().map(|row| row[index]).collect()
    }
}

/// A [`SampleWindow`] after zero-phase filtering with the warm-up prefix removed.
#[derive(Debug, Clone, PartialEq)]
pub struct FilteredWindow {
    channels: Vec<Vec<f64>>,
}

impl FilteredWindow {
    /// Builds a window from per-channel series. All channels must share one length.
    pub(crate) fn from_channels(channels: Vec<Vec<f64>>) -> Self {
        debug_assert_eq!(channels.len(), CHANNEL_COUNT);
        debug_assert!(channels.windows(2).all(|pair| pair[0].len() == pair[1].len()));
        Self { channels }
    }

    /// Samples per channel.
    pub fn len(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    /// True when no samples survived filtering.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// One channel's filtered series.
    pub fn channel(&self, index: usize) -> &[f64] {
        &self.channels[index]
    }

    /// All channels, channel-major.
    pub fn channels(&self) -> &[Vec<f64>] {
        &self.channels
    }
}

/// An encoded waveform image plus its capture time.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// PNG bytes
    pub image_png: Vec<u8>,
    /// When the underlying window was captured
    pub captured_at: DateTime<Utc>,
}

impl Snapshot {
    /// Base64 form used as `waveform_data` on the wire.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.image_png)
    }
}

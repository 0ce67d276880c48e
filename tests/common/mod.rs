//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use eeg_relay::config::ClientConfig;
use std::fs;
use std::path::{Path, PathBuf};

pub const SESSION: &str = "OpenBCISession_2024-03-01_10-00-00";

const HEADER: &str = "Sample Index, EXG Channel 0, EXG Channel 1, EXG Channel 2, EXG Channel 3, \
                      EXG Channel 4, EXG Channel 5, EXG Channel 6, EXG Channel 7, Accel Channel 0";

/// Recording text with `rows` samples; sample `i` of channel `c` is `value(i, c)`.
pub fn recording_text(rows: usize, value: impl Fn(usize, usize) -> f64) -> String {
    let mut text = String::from("%OpenBCI Raw EXG Data\n%Number of channels = 8\n%Sample Rate = 250 Hz\n");
    text.push_str(HEADER);
    text.push('\n');
    for i in 0..rows {
        let channels: Vec<String> = (0..8).map(|c| format!("{:.4}", value(i, c))).collect();
        text.push_str(&format!("{}, {}, 0.0\n", i % 256, channels.join(", ")));
    }
    text
}

/// Writes `<root>/<session>/<name>` and returns its path.
pub fn write_recording(root: &Path, session: &str, name: &str, text: &str) -> PathBuf {
    let dir = root.join(session);
    fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    fs::write(&path, text).unwrap();
    path
}

/// A 10 Hz sine per channel with a per-channel offset, 1300 rows.
pub fn sine_recording() -> String {
    recording_text(1300, |i, c| {
        let t = i as f64 / 250.0;
        100.0 * c as f64 + 20.0 * (2.0 * std::f64::consts::PI * 10.0 * t).sin()
    })
}

/// Client settings pointing at `server_url`, reading from `recordings_dir`, with a small
/// canvas and a short poll interval so tests run quickly.
pub fn client_config(server_url: &str, recordings_dir: &Path) -> ClientConfig {
    let mut config = ClientConfig::default();
    config.server_url = server_url.to_string();
    config.secret = "test-secret".to_string();
    config.recordings_dir = recordings_dir.to_path_buf();
    config.render.width = 300;
    config.render.height = 400;
    config.poll_interval_ms = 200;
    config.upload_timeout_ms = 1000;
    config.cleanup_timeout_ms = 1000;
    config.join_timeout_ms = 2000;
    config
}

//! Locating the newest recording and reading its trailing sample window.
//!
//! Recordings are laid out as `<root>/<session dir>/<data file>`. Data files are
//! comma-separated text with `%`-prefixed comment lines, one header row, and one row
//! per sample. Only the first [`CHANNEL_COUNT`] columns whose header contains the
//! channel tag (e.g. `EXG Channel`) are used.

use crate::data::window::{Sample, SampleWindow, CHANNEL_COUNT};
use crate::error::{RelayError, RelayResult};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, warn};

/// Naming rules for session directories and data files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLayout {
    /// Session directory name prefix
    pub session_prefix: String,
    /// Data file name prefix
    pub file_prefix: String,
    /// Data file name suffix
    pub file_suffix: String,
}

impl SourceLayout {
    fn is_session(&self, name: &str) -> bool {
        name.starts_with(&self.session_prefix)
    }

    fn is_data_file(&self, name: &str) -> bool {
        name.starts_with(&self.file_prefix) && name.ends_with(&self.file_suffix)
    }
}

/// Finds the most recently modified data file inside the most recently modified session.
pub fn locate_latest_source(root: &Path, layout: &SourceLayout) -> RelayResult<PathBuf> {
    let session = newest_entry(root, |path, name| path.is_dir() && layout.is_session(name))
        .map_err(|e| not_found(root, format!("cannot scan recordings root: {e}")))?
        .ok_or_else(|| {
            not_found(
                root,
                format!("no directory starting with '{}'", layout.session_prefix),
            )
        })?;

    let file = newest_entry(&session, |path, name| {
        path.is_file() && layout.is_data_file(name)
    })
    .map_err(|e| not_found(&session, format!("cannot scan session: {e}")))?
    .ok_or_else(|| {
        not_found(
            &session,
            format!(
                "no file matching '{}*{}'",
                layout.file_prefix, layout.file_suffix
            ),
        )
    })?;

    debug!(source = %file.display(), "resolved latest data source");
    Ok(file)
}

fn not_found(root: &Path, reason: String) -> RelayError {
    RelayError::SourceNotFound {
        root: root.to_path_buf(),
        reason,
    }
}

fn newest_entry<F>(dir: &Path, accept: F) -> std::io::Result<Option<PathBuf>>
where
    F: Fn(&Path, &str) -> bool,
{
    let mut newest: Option<(SystemTime, PathBuf)> = None;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if !accept(&path, name) {
            continue;
        }
        let modified = entry.metadata()?.modified()?;
        if newest.as_ref().map_or(true, |(best, _)| modified > *best) {
            newest = Some((modified, path));
        }
    }
    Ok(newest.map(|(_, path)| path))
}

/// Reads `path` and returns exactly `window_len` rows of the tagged channels.
///
/// Short recordings are front-padded with copies of their first row; long ones keep only
/// the trailing rows. Missing values are repaired afterwards, see [`repair_missing`].
pub fn read_window(path: &Path, window_len: usize, channel_tag: &str) -> RelayResult<SampleWindow> {
    let file = fs::File::open(path)
        .map_err(|e| RelayError::Read(format!("cannot open {}: {e}", path.display())))?;
    let rows = parse_samples(file, channel_tag)?;
    let mut samples = fit_to_window(rows, window_len);
    repair_missing(&mut samples);
    Ok(SampleWindow::new(samples))
}

/// Parses sample rows from comma-separated text.
pub fn parse_samples<R: std::io::Read>(input: R, channel_tag: &str) -> RelayResult<Vec<Sample>> {
    let mut reader = csv::ReaderBuilder::new()
        .comment(Some(b'%'))
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(input);

    let headers = reader
        .headers()
        .map_err(|e| RelayError::Read(format!("cannot read header row: {e}")))?
        .clone();
    let columns: Vec<usize> = headers
        .iter()
        .enumerate()
        .filter(|(_, name)| name.contains(channel_tag))
        .map(|(index, _)| index)
        .take(CHANNEL_COUNT)
        .collect();
    if columns.len() < CHANNEL_COUNT {
        return Err(RelayError::Read(format!(
            "expected {CHANNEL_COUNT} '{channel_tag}' columns, found {}",
            columns.len()
        )));
    }

    let mut rows = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record.map_err(|e| RelayError::Read(format!("row {}: {e}", line + 1)))?;
        let mut sample = [f64::NAN; CHANNEL_COUNT];
        for (slot, &column) in sample.iter_mut().zip(&columns) {
            *slot = parse_value(record.get(column).unwrap_or(""))
                .map_err(|raw| RelayError::Read(format!("row {}: bad value '{raw}'", line + 1)))?;
        }
        rows.push(sample);
    }

    if rows.is_empty() {
        return Err(RelayError::Read("no sample rows".to_string()));
    }
    Ok(rows)
}

fn parse_value(raw: &str) -> Result<f64, &str> {
    if raw.is_empty() {
        return Ok(f64::NAN);
    }
    raw.parse::<f64>().map_err(|_| raw)
}

/// Pads at the front with the first row, or keeps the trailing `window_len` rows.
pub fn fit_to_window(mut rows: Vec<Sample>, window_len: usize) -> Vec<Sample> {
    if rows.len() >= window_len {
        rows.split_off(rows.len() - window_len)
    } else {
        let Some(&first) = rows.first() else {
            return rows;
        };
        let mut padded = vec![first; window_len - rows.len()];
        padded.append(&mut rows);
        padded
    }
}

/// Replaces missing values channel by channel.
///
/// A channel with no values at all becomes zeros. Otherwise every missing entry takes
/// the last present value of that channel.
pub fn repair_missing(samples: &mut [Sample]) {
    for channel in 0..CHANNEL_COUNT {
        let missing = samples.iter().filter(|row| row[channel].is_nan()).count();
        if missing == 0 {
            continue;
        }

        let fill = if missing == samples.len() {
            warn!(channel, "channel entirely missing, zero-filled");
            0.0
        } else if let Some(last) = samples.iter().rev().map(|row| row[channel]).find(|v| !v.is_nan()) {
            warn!(channel, missing, fill = last, "missing values filled with last present value");
            last
        } else {
            warn!(channel, "no present value found, zero-filled");
            0.0
        };

        for row in samples.iter_mut() {
            if row[channel].is_nan() {
                row[channel] = fill;
            }
        }
    }
}

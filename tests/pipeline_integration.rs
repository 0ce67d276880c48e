//! Acquisition pipeline integration tests: source discovery, windowing and capture
//! against real files on disk.

mod common;

use common::{client_config, recording_text, sine_recording, write_recording, SESSION};
use eeg_relay::data::source::{locate_latest_source, read_window, SourceLayout};
use eeg_relay::data::CapturePipeline;
use eeg_relay::error::RelayError;
use std::fs::{self, File};
use std::path::Path;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

fn layout() -> SourceLayout {
    SourceLayout {
        session_prefix: "OpenBCISession_".to_string(),
        file_prefix: "OpenBCI-RAW-".to_string(),
        file_suffix: ".txt".to_string(),
    }
}

fn age(path: &Path, seconds: u64) {
    let when = SystemTime::now() - Duration::from_secs(seconds);
    File::open(path).unwrap().set_modified(when).unwrap();
}

#[test]
fn test_latest_file_in_session_wins() {
    let root = TempDir::new().unwrap();
    let older = write_recording(root.path(), SESSION, "OpenBCI-RAW-older.txt", "x");
    let newer = write_recording(root.path(), SESSION, "OpenBCI-RAW-newer.txt", "x");
    age(&older, 600);
    age(&newer, 60);

    let found = locate_latest_source(root.path(), &layout()).unwrap();
    assert_eq!(found, newer);

    // Swap the ages and the choice follows.
    age(&newer, 900);
    let found = locate_latest_source(root.path(), &layout()).unwrap();
    assert_eq!(found, older);
}

#[test]
fn test_latest_session_wins_and_unrelated_names_ignored() {
    let root = TempDir::new().unwrap();
    write_recording(root.path(), "OpenBCISession_old", "OpenBCI-RAW-a.txt", "x");
    let current = write_recording(root.path(), "OpenBCISession_new", "OpenBCI-RAW-b.txt", "x");
    write_recording(root.path(), "OpenBCISession_new", "notes.txt", "x");
    write_recording(root.path(), "Backup_newest", "OpenBCI-RAW-c.txt", "x");

    age(&root.path().join("OpenBCISession_old"), 600);
    age(&root.path().join("OpenBCISession_new"), 60);
    age(&root.path().join("Backup_newest"), 1);
    age(&root.path().join("OpenBCISession_new").join("notes.txt"), 1);
    age(&current, 30);

    let found = locate_latest_source(root.path(), &layout()).unwrap();
    assert_eq!(found, current);
}

#[test]
fn test_missing_source_reported() {
    let root = TempDir::new().unwrap();
    assert!(matches!(
        locate_latest_source(root.path(), &layout()),
        Err(RelayError::SourceNotFound { .. })
    ));

    fs::create_dir_all(root.path().join(SESSION)).unwrap();
    let err = locate_latest_source(root.path(), &layout()).unwrap_err();
    assert!(matches!(err, RelayError::SourceNotFound { .. }));
    assert!(!err.is_recoverable());

    assert!(matches!(
        locate_latest_source(&root.path().join("absent"), &layout()),
        Err(RelayError::SourceNotFound { .. })
    ));
}

#[test]
fn test_short_recording_is_front_padded() {
    let root = TempDir::new().unwrap();
    let text = recording_text(100, |i, c| (i * 10 + c) as f64);
    let path = write_recording(root.path(), SESSION, "OpenBCI-RAW-short.txt", &text);

    let window = read_window(&path, 500, "EXG Channel").unwrap();
    assert_eq!(window.len(), 500);

    let first = window.samples()[400];
    assert_eq!(first, [0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
    assert!(window.samples()[..400].iter().all(|row| *row == first));
    assert_eq!(window.samples()[499][0], 990.0);
}

#[test]
fn test_long_recording_keeps_trailing_rows() {
    let root = TempDir::new().unwrap();
    let text = recording_text(2000, |i, _| i as f64);
    let path = write_recording(root.path(), SESSION, "OpenBCI-RAW-long.txt", &text);

    let window = read_window(&path, 1250, "EXG Channel").unwrap();
    assert_eq!(window.len(), 1250);
    assert_eq!(window.samples()[0][0], 750.0);
    assert_eq!(window.samples()[1249][7], 1999.0);
}

#[test]
fn test_missing_values_repaired_after_windowing() {
    let root = TempDir::new().unwrap();
    let mut text = recording_text(0, |_, _| 0.0);
    for i in 0..20 {
        // Channel 1 is never present, channel 3 only in rows 5 and 12.
        let ch3 = match i {
            5 => "4.0",
            12 => "6.0",
            _ => "",
        };
        text.push_str(&format!("{i}, 1.0, , 2.0, {ch3}, 1.0, 1.0, 1.0, 1.0, 0.0\n"));
    }
    let path = write_recording(root.path(), SESSION, "OpenBCI-RAW-gaps.txt", &text);

    let window = read_window(&path, 20, "EXG Channel").unwrap();
    assert!(window.channel(1).iter().all(|v| *v == 0.0));
    let ch3 = window.channel(3);
    assert_eq!(ch3[5], 4.0);
    assert_eq!(ch3[12], 6.0);
    assert!(ch3
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != 5 && *i != 12)
        .all(|(_, v)| *v == 6.0));
}

#[test]
fn test_capture_produces_png_snapshot() {
    let root = TempDir::new().unwrap();
    let path = write_recording(root.path(), SESSION, "OpenBCI-RAW-sine.txt", &sine_recording());
    let config = client_config("http://127.0.0.1:9", root.path());
    let pipeline = CapturePipeline::new(&config).unwrap();

    let filtered = pipeline.filtered_window(&path).unwrap();
    assert_eq!(filtered.len(), 1250 - 30);

    let snapshot = pipeline.capture(&path).unwrap();
    assert_eq!(&snapshot.image_png[..8], b"\x89PNG\r\n\x1a\n");
    let image = image::load_from_memory(&snapshot.image_png).unwrap();
    assert_eq!((image.width(), image.height()), (300, 400));
    assert!(!snapshot.to_base64().is_empty());
}

#[test]
fn test_capture_of_unparseable_file_is_recoverable() {
    let root = TempDir::new().unwrap();
    let path = write_recording(root.path(), SESSION, "OpenBCI-RAW-bad.txt", "not,a,recording\n1,2,3\n");
    let config = client_config("http://127.0.0.1:9", root.path());
    let pipeline = CapturePipeline::new(&config).unwrap();

    let err = pipeline.capture(&path).unwrap_err();
    assert!(matches!(err, RelayError::Read(_)));
    assert!(err.is_recoverable());
}

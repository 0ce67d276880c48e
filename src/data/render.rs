//! Renders a filtered window into a PNG snapshot.
//!
//! The canvas is split into one horizontal panel per channel, stacked top to bottom.
//! Panels share a vertical span: with `h` the largest peak-to-peak amplitude of any
//! channel, panel `i` shows `mean_i ± h * 5/3`, so channels stay comparable while each
//! one is centred on its own offset.

use crate::config::RenderConfig;
use crate::data::window::{FilteredWindow, Snapshot, CHANNEL_COUNT};
use crate::error::{RelayError, RelayResult};
use chrono::Utc;
use image::{ImageFormat, Rgb, RgbImage};
use std::io::Cursor;

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const GRID: Rgb<u8> = Rgb([225, 225, 225]);
const SEPARATOR: Rgb<u8> = Rgb([160, 160, 160]);
const TRACE: Rgb<u8> = Rgb([31, 119, 180]);

/// Margin around each panel's plot area, in pixels.
const MARGIN: u32 = 8;

/// Draws filtered windows as stacked channel traces.
#[derive(Debug, Clone)]
pub struct WaveformRenderer {
    width: u32,
    height: u32,
    sample_rate_hz: f64,
}

impl WaveformRenderer {
    /// Renderer for a canvas of the configured size.
    pub fn new(render: RenderConfig, sample_rate_hz: f64) -> Self {
        Self {
            width: render.width,
            height: render.height,
            sample_rate_hz,
        }
    }

    /// Renders `window` and encodes it as PNG.
    pub fn render(&self, window: &FilteredWindow) -> RelayResult<Snapshot> {
        if window.is_empty() {
            return Err(RelayError::Render("window has no samples".to_string()));
        }
        let panel_height = self.height / CHANNEL_COUNT as u32;
        if self.width <= 2 * MARGIN || panel_height <= 2 * MARGIN {
            return Err(RelayError::Render(format!(
                "canvas {}x{} too small for {CHANNEL_COUNT} panels",
                self.width, self.height
            )));
        }

        let mut canvas = RgbImage::from_pixel(self.width, self.height, BACKGROUND);
        let spans = channel_spans(window);

        for (index, (series, (low, high))) in window.channels().iter().zip(spans).enumerate() {
            let top = index as u32 * panel_height;
            let panel = Panel {
                left: MARGIN,
                top: top + MARGIN,
                width: self.width - 2 * MARGIN,
                height: panel_height - 2 * MARGIN,
            };
            self.draw_grid(&mut canvas, &panel, series.len());
            draw_trace(&mut canvas, &panel, series, low, high);
            if index > 0 {
                draw_hline(&mut canvas, top, 0, self.width - 1, SEPARATOR);
            }
        }

        let mut encoded = Vec::new();
        canvas
            .write_to(&mut Cursor::new(&mut encoded), ImageFormat::Png)
            .map_err(|e| RelayError::Render(format!("PNG encoding failed: {e}")))?;

        Ok(Snapshot {
            image_png: encoded,
            captured_at: Utc::now(),
        })
    }

    /// Horizontal centre line plus one vertical line per second of data.
    fn draw_grid(&self, canvas: &mut RgbImage, panel: &Panel, samples: usize) {
        draw_hline(
            canvas,
            panel.top + panel.height / 2,
            panel.left,
            panel.right(),
            GRID,
        );
        if samples < 2 || self.sample_rate_hz <= 0.0 {
            return;
        }
        let step = self.sample_rate_hz.round() as usize;
        if step == 0 {
            return;
        }
        for sample in (0..samples).step_by(step) {
            let x = panel.x_for(sample, samples);
            for y in panel.top..=panel.bottom() {
                canvas.put_pixel(x, y, GRID);
            }
        }
    }
}

/// Vertical `(low, high)` bounds for each channel's panel.
pub fn channel_spans(window: &FilteredWindow) -> Vec<(f64, f64)> {
    let height = window
        .channels()
        .iter()
        .map(|series| {
            let (min, max) = min_max(series);
            max - min
        })
        .fold(0.0_f64, f64::max);

    window
        .channels()
        .iter()
        .map(|series| {
            let mean = series.iter().sum::<f64>() / series.len().max(1) as f64;
            let half = if height > 0.0 { height * 5.0 / 3.0 } else { 1.0 };
            (mean - half, mean + half)
        })
        .collect()
}

fn min_max(series: &[f64]) -> (f64, f64) {
    series
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        })
}

struct Panel {
    left: u32,
    top: u32,
    width: u32,
    height: u32,
}

impl Panel {
    fn right(&self) -> u32 {
        self.left + self.width - 1
    }

    fn bottom(&self) -> u32 {
        self.top + self.height - 1
    }

    fn x_for(&self, sample: usize, samples: usize) -> u32 {
        if samples < 2 {
            return self.left;
        }
        let fraction = sample as f64 / (samples - 1) as f64;
        self.left + (fraction * f64::from(self.width - 1)).round() as u32
    }

    fn y_for(&self, value: f64, low: f64, high: f64) -> u32 {
        let fraction = ((value - low) / (high - low)).clamp(0.0, 1.0);
        self.bottom() - (fraction * f64::from(self.height - 1)).round() as u32
    }
}

fn draw_trace(canvas: &mut RgbImage, panel: &Panel, series: &[f64], low: f64, high: f64) {
    let points: Vec<(u32, u32)> = series
        .iter()
        .enumerate()
        .map(|(i, &v)| (panel.x_for(i, series.len()), panel.y_for(v, low, high)))
        .collect();

    if let [only] = points.as_slice() {
        canvas.put_pixel(only.0, only.1, TRACE);
        return;
    }
    for pair in points.windows(2) {
        draw_line(canvas, pair[0], pair[1], TRACE);
    }
}

fn draw_hline(canvas: &mut RgbImage, y: u32, from: u32, to: u32, color: Rgb<u8>) {
    for x in from..=to {
        canvas.put_pixel(x, y, color);
    }
}

/// Bresenham line between two in-bounds points.
fn draw_line(canvas: &mut RgbImage, from: (u32, u32), to: (u32, u32), color: Rgb<u8>) {
    let (mut x, mut y) = (i64::from(from.0), i64::from(from.1));
    let (x1, y1) = (i64::from(to.0), i64::from(to.1));
    let dx = (x1 - x).abs();
    let dy = -(y1 - y).abs();
    let sx = if x < x1 { 1 } else { -1 };
    let sy = if y < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        canvas.put_pixel(x as u32, y as u32, color);
        if x == x1 && y == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

//! Zero-phase Butterworth low-pass filtering built from cascaded biquads.
//!
//! An order-`n` Butterworth low-pass is realised as `n / 2` second-order sections from
//! the `biquad` crate, each with the Q of one Butterworth pole pair. Zero phase comes from
//! running the cascade forward, then backward over the reversed output. Before filtering,
//! the signal is extended at both ends by odd reflection of [`ZeroPhaseLowpass::padding_len`]
//! samples, and each pass starts from the steady state of its first input value so DC
//! offsets (EEG electrodes sit at large offsets) do not ring through the window.

use crate::data::window::{FilteredWindow, SampleWindow, CHANNEL_COUNT};
use crate::error::{RelayError, RelayResult};
use biquad::{Biquad, Coefficients, DirectForm2Transposed, ToHertz, Type};
use std::f64::consts::PI;

/// Design parameters for [`ZeroPhaseLowpass`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LowpassConfig {
    /// Cutoff frequency in Hz.
    pub cutoff_hz: f64,
    /// Sample rate of the data in Hz.
    pub sample_rate_hz: f64,
    /// Filter order, must be even.
    pub order: usize,
}

/// A zero-phase Butterworth low-pass filter.
///
/// # Example
///
/// ```
/// use eeg_relay::data::iir_filter::{LowpassConfig, ZeroPhaseLowpass};
///
/// let filter = ZeroPhaseLowpass::new(LowpassConfig {
///     cutoff_hz: 50.0,
///     sample_rate_hz: 250.0,
///     order: 4,
/// })?;
/// let smoothed = filter.filtfilt(&[0.0; 64])?;
/// assert_eq!(smoothed.len(), 64);
/// # Ok::<(), eeg_relay::error::RelayError>(())
/// ```
#[derive(Debug, Clone)]
pub struct ZeroPhaseLowpass {
    sections: Vec<Coefficients<f64>>,
    order: usize,
}

impl ZeroPhaseLowpass {
    /// Designs the cascade. Fails on odd orders or a cutoff outside `(0, fs/2)`.
    pub fn new(config: LowpassConfig) -> RelayResult<Self> {
        if config.order < 2 || config.order % 2 != 0 {
            return Err(RelayError::Filter(format!(
                "order must be an even number >= 2, got {}",
                config.order
            )));
        }
        if !(config.cutoff_hz > 0.0 && config.cutoff_hz < config.sample_rate_hz / 2.0) {
            return Err(RelayError::Filter(format!(
                "cutoff {} Hz outside (0, {}) Hz",
                config.cutoff_hz,
                config.sample_rate_hz / 2.0
            )));
        }

        let sections = butterworth_q(config.order)
            .into_iter()
            .map(|q| {
                Coefficients::<f64>::from_params(
                    Type::LowPass,
                    config.sample_rate_hz.hz(),
                    config.cutoff_hz.hz(),
                    q,
                )
                .map_err(|e| RelayError::Filter(format!("cannot design section: {e:?}")))
            })
            .collect::<RelayResult<Vec<_>>>()?;

        Ok(Self {
            sections,
            order: config.order,
        })
    }

    /// Edge extension length used for an order-`order` filter.
    pub fn padding_len(order: usize) -> usize {
        3 * (order + 1)
    }

    /// Shortest input [`Self::filtfilt`] accepts.
    pub fn min_input_len(&self) -> usize {
        Self::padding_len(self.order) + 1
    }

    /// Filters forward and backward. Output has the input's length.
    pub fn filtfilt(&self, input: &[f64]) -> RelayResult<Vec<f64>> {
        let pad = Self::padding_len(self.order);
        if input.len() <= pad {
            return Err(RelayError::Filter(format!(
                "input of {} samples too short; needs more than {pad}",
                input.len()
            )));
        }

        let extended = odd_extend(input, pad);
        let mut forward = self.run(&extended);
        forward.reverse();
        let mut backward = self.run(&forward);
        backward.reverse();

        Ok(backward[pad..pad + input.len()].to_vec())
    }

    fn run(&self, input: &[f64]) -> Vec<f64> {
        let offset = input.first().copied().unwrap_or(0.0);
        let mut stages: Vec<DirectForm2Transposed<f64>> = self
            .sections
            .iter()
            .map(|coeffs| DirectForm2Transposed::<f64>::new(*coeffs))
            .collect();

        input
            .iter()
            .map(|&x| {
                let y = stages
                    .iter_mut()
                    .fold(x - offset, |acc, stage| stage.run(acc));
                y + offset
            })
            .collect()
    }
}

/// Q of each second-order section of an order-`order` Butterworth filter.
fn butterworth_q(order: usize) -> Vec<f64> {
    (0..order / 2)
        .map(|k| {
            let angle = (2 * k + 1) as f64 * PI / (2 * order) as f64;
            1.0 / (2.0 * angle.sin())
        })
        .collect()
}

fn odd_extend(input: &[f64], pad: usize) -> Vec<f64> {
    let first = input[0];
    let last = input[input.len() - 1];
    let n = input.len();

    let mut out = Vec::with_capacity(n + 2 * pad);
    out.extend((1..=pad).rev().map(|i| 2.0 * first - input[i]));
    out.extend_from_slice(input);
    out.extend((1..=pad).map(|i| 2.0 * last - input[n - 1 - i]));
    out
}

/// Filters every channel of `window` and drops the first `warmup` samples.
pub fn apply_filter(
    window: &SampleWindow,
    filter: &ZeroPhaseLowpass,
    warmup: usize,
) -> RelayResult<FilteredWindow> {
    if window.len() <= warmup {
        return Err(RelayError::Filter(format!(
            "window of {} samples does not outlast the {warmup}-sample warm-up",
            window.len()
        )));
    }

    let channels = (0..CHANNEL_COUNT)
        .map(|channel| {
            let mut filtered = filter.filtfilt(&window.channel(channel))?;
            Ok(filtered.split_off(warmup))
        })
        .collect::<RelayResult<Vec<_>>>()?;

    Ok(FilteredWindow::from_channels(channels))
}

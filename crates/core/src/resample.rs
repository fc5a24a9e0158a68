//! Sample-rate conversion between the telephony and AI legs
//!
//! Upsampling (8 kHz to the AI input rate) repeats each sample. There is no
//! interpolation filter, so the upper band carries imaging artifacts. Speech
//! models tolerate this and the path stays allocation-light, so it is kept
//! as a known limitation.
//!
//! Downsampling (AI output rate to 8 kHz) runs a windowed-sinc low-pass FIR
//! before keeping every Nth sample. The [`Decimator`] carries the trailing
//! `taps - 1` input samples and the sub-group phase between calls, so a
//! stream processed in arbitrary chunks produces the same output as the
//! stream processed in one piece.

use std::f64::consts::PI;

use crate::{Error, Result};

/// Default FIR length
pub const DEFAULT_TAPS: usize = 63;

/// Cutoff as a fraction of the output Nyquist frequency
pub const DEFAULT_CUTOFF_RATIO: f64 = 0.85;

/// Repeat each input sample `factor` times
pub fn upsample_by_duplication(pcm: &[i16], factor: usize) -> Vec<i16> {
    if factor <= 1 {
        return pcm.to_vec();
    }
    let mut out = Vec::with_capacity(pcm.len() * factor);
    for &sample in pcm {
        out.extend(std::iter::repeat(sample).take(factor));
    }
    out
}

/// Low-pass filter then decimate, continuing from `state`
pub fn decimate_with_lowpass(pcm: &[i16], state: &mut Decimator) -> Vec<i16> {
    state.process(pcm)
}

/// Blackman-windowed sinc low-pass, normalized to unity DC gain.
///
/// `cutoff` is in cycles per input sample (0.0 - 0.5).
pub fn design_lowpass(taps: usize, cutoff: f64) -> Result<Vec<f32>> {
    if taps < 3 || taps % 2 == 0 {
        return Err(Error::InvalidFilter(format!(
            "tap count must be odd and at least 3, got {}",
            taps
        )));
    }
    if !(cutoff > 0.0 && cutoff < 0.5) {
        return Err(Error::InvalidFilter(format!(
            "normalized cutoff must be in (0, 0.5), got {}",
            cutoff
        )));
    }

    let m = (taps - 1) as f64;
    let mut coefficients: Vec<f64> = (0..taps)
        .map(|n| {
            let n = n as f64;
            let x = n - m / 2.0;
            let sinc = if x == 0.0 {
                2.0 * cutoff
            } else {
                (2.0 * PI * cutoff * x).sin() / (PI * x)
            };
            let window = 0.42 - 0.5 * (2.0 * PI * n / m).cos() + 0.08 * (4.0 * PI * n / m).cos();
            sinc * window
        })
        .collect();

    let sum: f64 = coefficients.iter().sum();
    for c in coefficients.iter_mut() {
        *c /= sum;
    }

    Ok(coefficients.into_iter().map(|c| c as f32).collect())
}

/// Streaming FIR decimator
///
/// Owned by exactly one call; never shared.
#[derive(Debug, Clone)]
pub struct Decimator {
    factor: usize,
    coefficients: Vec<f32>,
    /// Last `taps - 1` input samples
    history: Vec<i16>,
    /// Input samples to skip before the next kept output
    phase: usize,
}

impl Decimator {
    /// Create a decimator with an explicit filter design
    pub fn new(factor: usize, taps: usize, cutoff: f64) -> Result<Self> {
        if factor == 0 {
            return Err(Error::InvalidFilter("decimation factor must be >= 1".into()));
        }
        let coefficients = design_lowpass(taps, cutoff)?;
        Ok(Self {
            factor,
            history: vec![0; taps - 1],
            coefficients,
            phase: 0,
        })
    }

    /// Decimator for `input_rate -> output_rate` with the default filter
    pub fn for_rates(input_rate: u32, output_rate: u32) -> Result<Self> {
        if output_rate == 0 || input_rate % output_rate != 0 {
            return Err(Error::InvalidFilter(format!(
                "{} Hz is not an integer multiple of {} Hz",
                input_rate, output_rate
            )));
        }
        let factor = (input_rate / output_rate) as usize;
        let cutoff_hz = output_rate as f64 / 2.0 * DEFAULT_CUTOFF_RATIO;
        Self::new(factor, DEFAULT_TAPS, cutoff_hz / input_rate as f64)
    }

    pub fn factor(&self) -> usize {
        self.factor
    }

    pub fn taps(&self) -> usize {
        self.coefficients.len()
    }

    /// Samples still to be skipped before the next output sample
    pub fn phase(&self) -> usize {
        self.phase
    }

    /// Filter and decimate one chunk
    pub fn process(&mut self, input: &[i16]) -> Vec<i16> {
        if input.is_empty() {
            return Vec::new();
        }

        let span = self.coefficients.len() - 1;
        let mut window = Vec::with_capacity(span + input.len());
        window.extend_from_slice(&self.history);
        window.extend_from_slice(input);

        let mut output = Vec::with_capacity(input.len() / self.factor + 1);
        let mut position = self.phase;
        while position < input.len() {
            let acc: f32 = window[position..=position + span]
                .iter()
                .zip(self.coefficients.iter())
                .map(|(&s, &c)| s as f32 * c)
                .sum();
            output.push(acc.round().clamp(i16::MIN as f32, i16::MAX as f32) as i16);
            position += self.factor;
        }

        self.phase = position - input.len();
        self.history.clear();
        self.history.extend_from_slice(&window[window.len() - span..]);
        output
    }

    /// Drop carried history and phase
    pub fn reset(&mut self) {
        self.history.iter_mut().for_each(|s| *s = 0);
        self.phase = 0;
    }
}

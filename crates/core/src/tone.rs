//! Synthetic confidence tone
//!
//! Played to the caller right after the stream starts, while the AI session
//! is still negotiating.

use bytes::Bytes;
use std::f32::consts::PI;

use crate::audio::telephony;
use crate::codec::encode_mulaw;
use crate::framing::rechunk;

/// Ramp length applied at both ends to avoid clicks
const RAMP_MS: u32 = 10;

/// Build `duration_ms` of a sine tone as whole μ-law telephony frames.
///
/// `amplitude` is a fraction of full scale and is clamped to 0.0 - 1.0.
pub fn confidence_tone(duration_ms: u32, frequency_hz: f32, amplitude: f32) -> Vec<Bytes> {
    let rate = telephony::SAMPLE_RATE;
    let frames = (duration_ms / telephony::FRAME_MS) as usize;
    let total = frames * telephony::FRAME_BYTES;
    if total == 0 {
        return Vec::new();
    }

    let peak = amplitude.clamp(0.0, 1.0) * i16::MAX as f32;
    let ramp = ((rate * RAMP_MS / 1000) as usize).min(total / 2).max(1);

    let samples: Vec<i16> = (0..total)
        .map(|n| {
            let envelope = (n.min(total - 1 - n) as f32 / ramp as f32).min(1.0);
            let phase = 2.0 * PI * frequency_hz * n as f32 / rate as f32;
            (phase.sin() * peak * envelope) as i16
        })
        .collect();

    let mut remainder = Vec::new();
    rechunk(&encode_mulaw(&samples), telephony::FRAME_BYTES, &mut remainder)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::decode_mulaw;

    #[test]
    fn test_one_second_tone() {
        let frames = confidence_tone(1000, 440.0, 0.3);
        assert_eq!(frames.len(), 50);
        assert!(frames.iter().all(|f| f.len() == telephony::FRAME_BYTES));

        let middle = decode_mulaw(&frames[25]);
        let peak = middle.iter().map(|s| s.unsigned_abs()).max().unwrap();
        assert!(peak > 8000 && peak < 11000, "peak {}", peak);
    }

    #[test]
    fn test_zero_duration() {
        assert!(confidence_tone(0, 440.0, 0.3).is_empty());
        assert!(confidence_tone(19, 440.0, 0.3).is_empty());
    }
}

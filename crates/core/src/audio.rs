//! Audio frame types and utilities

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Telephony leg constants: 20 ms of 8 kHz μ-law per frame.
pub mod telephony {
    /// Telephony sample rate in Hz
    pub const SAMPLE_RATE: u32 = 8000;
    /// Frame duration in milliseconds
    pub const FRAME_MS: u32 = 20;
    /// Bytes per μ-law frame (one byte per sample)
    pub const FRAME_BYTES: usize = (SAMPLE_RATE * FRAME_MS / 1000) as usize;
}

/// Supported audio sample rates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SampleRate {
    /// 8kHz - Telephony
    #[default]
    Hz8000,
    /// 16kHz - AI input
    Hz16000,
    /// 24kHz - AI output
    Hz24000,
}

impl SampleRate {
    /// Get sample rate as u32
    pub fn as_u32(&self) -> u32 {
        match self {
            SampleRate::Hz8000 => 8000,
            SampleRate::Hz16000 => 16000,
            SampleRate::Hz24000 => 24000,
        }
    }

    /// Parse a rate in Hz
    pub fn from_hz(hz: u32) -> Option<Self> {
        match hz {
            8000 => Some(SampleRate::Hz8000),
            16000 => Some(SampleRate::Hz16000),
            24000 => Some(SampleRate::Hz24000),
            _ => None,
        }
    }

    /// Integer ratio between this rate and the telephony rate
    pub fn telephony_ratio(&self) -> usize {
        (self.as_u32() / telephony::SAMPLE_RATE) as usize
    }
}

/// Audio encoding formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioEncoding {
    /// 16-bit signed PCM (little-endian)
    Pcm16,
    /// μ-law (telephony)
    Mulaw,
}

/// Which leg a frame is headed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    ToTelephony,
    ToAi,
}

/// Audio format negotiated with the AI transport for one direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AiAudioFormat {
    /// Linear 16-bit little-endian PCM at the given rate
    Pcm16(SampleRate),
    /// G.711 μ-law at 8 kHz, passed through untouched
    G711Ulaw,
}

impl AiAudioFormat {
    /// Build from the wire name and rate used in configuration
    pub fn from_parts(name: &str, sample_rate: u32) -> Result<Self> {
        match name {
            "pcm16" => SampleRate::from_hz(sample_rate)
                .map(AiAudioFormat::Pcm16)
                .ok_or_else(|| {
                    Error::UnsupportedFormat(format!("pcm16 at {} Hz", sample_rate))
                }),
            "g711_ulaw" => Ok(AiAudioFormat::G711Ulaw),
            other => Err(Error::UnsupportedFormat(other.to_string())),
        }
    }

    /// Name used on the AI wire
    pub fn wire_name(&self) -> &'static str {
        match self {
            AiAudioFormat::Pcm16(_) => "pcm16",
            AiAudioFormat::G711Ulaw => "g711_ulaw",
        }
    }

    pub fn sample_rate(&self) -> SampleRate {
        match self {
            AiAudioFormat::Pcm16(rate) => *rate,
            AiAudioFormat::G711Ulaw => SampleRate::Hz8000,
        }
    }
}

/// Immutable audio buffer with metadata
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    payload: Bytes,
    /// Sample encoding of the payload
    pub encoding: AudioEncoding,
    /// Sample rate
    pub sample_rate: SampleRate,
    /// Destination leg
    pub direction: Direction,
    /// Frame sequence number for ordering
    pub sequence: u64,
}

impl AudioFrame {
    pub fn new(
        payload: Bytes,
        encoding: AudioEncoding,
        sample_rate: SampleRate,
        direction: Direction,
        sequence: u64,
    ) -> Self {
        Self {
            payload,
            encoding,
            sample_rate,
            direction,
            sequence,
        }
    }

    /// Build a telephony frame, rejecting payloads that are not exactly one frame long
    pub fn telephony(payload: Bytes, direction: Direction, sequence: u64) -> Result<Self> {
        if payload.len() != telephony::FRAME_BYTES {
            return Err(Error::InvalidFrame(format!(
                "expected {} bytes, got {}",
                telephony::FRAME_BYTES,
                payload.len()
            )));
        }
        Ok(Self::new(
            payload,
            AudioEncoding::Mulaw,
            SampleRate::Hz8000,
            direction,
            sequence,
        ))
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }
}

/// Decode little-endian PCM16 bytes. A trailing odd byte is ignored.
pub fn pcm16_from_le_bytes(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// Encode samples as little-endian PCM16 bytes
pub fn pcm16_to_le_bytes(samples: &[i16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    bytes
}

/// Peak absolute amplitude of a block of samples
pub fn peak_amplitude(samples: &[i16]) -> u16 {
    samples
        .iter()
        .map(|s| s.unsigned_abs())
        .max()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_rate() {
        assert_eq!(SampleRate::Hz16000.telephony_ratio(), 2);
        assert_eq!(SampleRate::Hz24000.telephony_ratio(), 3);
        assert_eq!(SampleRate::from_hz(44100), None);
    }

    #[test]
    fn test_telephony_frame_length() {
        let ok = AudioFrame::telephony(Bytes::from(vec![0xFF; 160]), Direction::ToAi, 0);
        assert!(ok.is_ok());
        let frame = ok.unwrap();
        assert_eq!(frame.encoding, AudioEncoding::Mulaw);
        assert_eq!(frame.sample_rate, SampleRate::Hz8000);
        assert_eq!(frame.payload().len(), 160);

        let short = AudioFrame::telephony(Bytes::from(vec![0xFF; 159]), Direction::ToAi, 1);
        assert!(matches!(short, Err(Error::InvalidFrame(_))));
    }

    #[test]
    fn test_ai_audio_format_parsing() {
        assert_eq!(
            AiAudioFormat::from_parts("pcm16", 24000).unwrap(),
            AiAudioFormat::Pcm16(SampleRate::Hz24000)
        );
        assert_eq!(
            AiAudioFormat::from_parts("g711_ulaw", 0).unwrap(),
            AiAudioFormat::G711Ulaw
        );
        assert!(AiAudioFormat::from_parts("pcm16", 11025).is_err());
        assert!(AiAudioFormat::from_parts("opus", 48000).is_err());
    }

    #[test]
    fn test_pcm16_bytes_and_peak() {
        let samples = [0i16, -300, 1200, i16::MIN];
        let bytes = pcm16_to_le_bytes(&samples);
        assert_eq!(bytes.len(), 8);
        assert_eq!(pcm16_from_le_bytes(&bytes), samples);
        assert_eq!(peak_amplitude(&samples), 32768);
        assert_eq!(peak_amplitude(&[]), 0);

        // Odd trailing byte is not a sample
        assert_eq!(pcm16_from_le_bytes(&[1, 0, 7]), vec![1]);
    }
}

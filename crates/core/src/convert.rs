//! Per-call converters between the telephony and AI audio formats

use bytes::Bytes;

use crate::audio::{peak_amplitude, pcm16_from_le_bytes, pcm16_to_le_bytes, telephony};
use crate::codec::{decode_mulaw, encode_mulaw};
use crate::framing::FrameChunker;
use crate::resample::{upsample_by_duplication, Decimator};
use crate::{AiAudioFormat, Result};

/// One caller frame ready for analysis and forwarding
#[derive(Debug, Clone)]
pub struct InboundAudio {
    /// Decoded 8 kHz samples, used for energy detection and echo
    pub pcm: Vec<i16>,
    /// Peak absolute amplitude of `pcm`
    pub peak: u16,
    /// Bytes in the AI input format
    pub payload: Bytes,
}

/// Telephony μ-law to AI input format
#[derive(Debug, Clone)]
pub struct InboundConverter {
    format: AiAudioFormat,
}

impl InboundConverter {
    pub fn new(format: AiAudioFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> AiAudioFormat {
        self.format
    }

    pub fn convert(&self, mulaw: &[u8]) -> InboundAudio {
        let pcm = decode_mulaw(mulaw);
        let peak = peak_amplitude(&pcm);
        let payload = match self.format {
            AiAudioFormat::G711Ulaw => Bytes::copy_from_slice(mulaw),
            AiAudioFormat::Pcm16(rate) => {
                let upsampled = upsample_by_duplication(&pcm, rate.telephony_ratio());
                Bytes::from(pcm16_to_le_bytes(&upsampled))
            }
        };
        InboundAudio { pcm, peak, payload }
    }
}

/// AI output deltas to whole telephony frames
///
/// Holds the decimator history, the frame remainder and any odd trailing
/// PCM byte, all scoped to one call.
#[derive(Debug)]
pub struct OutboundConverter {
    format: AiAudioFormat,
    decimator: Option<Decimator>,
    chunker: FrameChunker,
    odd_byte: Option<u8>,
}

impl OutboundConverter {
    pub fn new(format: AiAudioFormat) -> Result<Self> {
        let decimator = match format {
            AiAudioFormat::Pcm16(rate) if rate.telephony_ratio() > 1 => {
                Some(Decimator::for_rates(rate.as_u32(), telephony::SAMPLE_RATE)?)
            }
            _ => None,
        };
        Ok(Self {
            format,
            decimator,
            chunker: FrameChunker::new(telephony::FRAME_BYTES),
            odd_byte: None,
        })
    }

    pub fn format(&self) -> AiAudioFormat {
        self.format
    }

    /// Convert one delta, returning every frame it completes
    pub fn push(&mut self, delta: &[u8]) -> Vec<Bytes> {
        if delta.is_empty() {
            return Vec::new();
        }

        let mulaw = match self.format {
            AiAudioFormat::G711Ulaw => return self.chunker.push(delta),
            AiAudioFormat::Pcm16(_) => {
                let pcm = self.take_samples(delta);
                let narrow = match self.decimator.as_mut() {
                    Some(decimator) => decimator.process(&pcm),
                    None => pcm,
                };
                encode_mulaw(&narrow)
            }
        };
        self.chunker.push(&mulaw)
    }

    /// Bytes held back waiting to complete a frame
    pub fn pending_bytes(&self) -> usize {
        self.chunker.pending()
    }

    /// Forget partially converted audio, e.g. after an interrupted response
    pub fn reset(&mut self) {
        self.chunker.clear();
        self.odd_byte = None;
        if let Some(decimator) = self.decimator.as_mut() {
            decimator.reset();
        }
    }

    fn take_samples(&mut self, delta: &[u8]) -> Vec<i16> {
        let mut bytes = delta;
        let mut samples = Vec::with_capacity(delta.len() / 2 + 1);

        if let Some(low) = self.odd_byte.take() {
            samples.push(i16::from_le_bytes([low, bytes[0]]));
            bytes = &bytes[1..];
        }
        samples.extend(pcm16_from_le_bytes(bytes));
        if bytes.len() % 2 == 1 {
            self.odd_byte = bytes.last().copied();
        }
        samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SampleRate;

    #[test]
    fn test_inbound_pcm16_upsamples() {
        let converter = InboundConverter::new(AiAudioFormat::Pcm16(SampleRate::Hz16000));
        let audio = converter.convert(&[0xFF; 160]);
        assert_eq!(audio.pcm.len(), 160);
        assert_eq!(audio.peak, 0);
        // 320 samples at 16 kHz, two bytes each
        assert_eq!(audio.payload.len(), 640);
    }

    #[test]
    fn test_inbound_ulaw_passthrough() {
        let converter = InboundConverter::new(AiAudioFormat::G711Ulaw);
        let frame = vec![0x80u8; 160];
        let audio = converter.convert(&frame);
        assert_eq!(&audio.payload[..], &frame[..]);
        assert_eq!(audio.peak, 32124);
    }

    #[test]
    fn test_outbound_frames_from_24k() {
        let mut converter =
            OutboundConverter::new(AiAudioFormat::Pcm16(SampleRate::Hz24000)).unwrap();
        // 40 ms at 24 kHz = 960 samples = 1920 bytes -> 320 samples at 8 kHz
        let frames = converter.push(&vec![0u8; 1920]);
        assert_eq!(frames.len(), 2);
        assert!(frames.iter().all(|f| f.len() == 160));
        assert!(frames.iter().all(|f| f.iter().all(|&b| b == 0xFF)));
        assert_eq!(converter.pending_bytes(), 0);
    }

    #[test]
    fn test_outbound_odd_length_deltas() {
        let samples: Vec<i16> = (0..960).map(|i| ((i % 40) * 200 - 4000) as i16).collect();
        let bytes = pcm16_to_le_bytes(&samples);

        let mut whole = OutboundConverter::new(AiAudioFormat::Pcm16(SampleRate::Hz24000)).unwrap();
        let expected = whole.push(&bytes);

        let mut split = OutboundConverter::new(AiAudioFormat::Pcm16(SampleRate::Hz24000)).unwrap();
        let mut actual = split.push(&bytes[..333]);
        actual.extend(split.push(&bytes[333..1001]));
        actual.extend(split.push(&bytes[1001..]));

        assert_eq!(actual, expected);
    }

    #[test]
    fn test_outbound_reset_drops_partial_audio() {
        let mut converter = OutboundConverter::new(AiAudioFormat::G711Ulaw).unwrap();
        assert!(converter.push(&[0xFF; 100]).is_empty());
        assert_eq!(converter.pending_bytes(), 100);
        converter.reset();
        assert_eq!(converter.pending_bytes(), 0);
        assert_eq!(converter.push(&[0xFF; 160]).len(), 1);
    }
}

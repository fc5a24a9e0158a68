//! Core types for the call bridge
//!
//! This crate provides the audio plumbing shared by every other crate:
//! - Audio frame types and sample helpers
//! - G.711 μ-law codec
//! - Upsampling and anti-aliased decimation with carry-over state
//! - Fixed-size frame re-chunking
//! - Per-call converters between the telephony and AI audio formats
//! - Error types

pub mod audio;
pub mod codec;
pub mod convert;
pub mod error;
pub mod framing;
pub mod resample;
pub mod tone;

pub use audio::{
    peak_amplitude, pcm16_from_le_bytes, pcm16_to_le_bytes, AiAudioFormat, AudioEncoding,
    AudioFrame, Direction, SampleRate,
};
pub use codec::{decode_mulaw, encode_mulaw, mulaw_to_pcm16, pcm16_to_mulaw};
pub use convert::{InboundAudio, InboundConverter, OutboundConverter};
pub use error::{Error, Result};
pub use framing::{rechunk, FrameChunker};
pub use resample::{decimate_with_lowpass, upsample_by_duplication, Decimator};
pub use tone::confidence_tone;

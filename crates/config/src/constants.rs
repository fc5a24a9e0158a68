//! Centralized defaults for the call bridge
//!
//! Every tunable that appears in [`crate::Settings`] takes its default from
//! here, so tests and the config loader agree on the same values.

/// HTTP/WebSocket listener
pub mod server {
    pub const DEFAULT_HOST: &str = "0.0.0.0";
    pub const DEFAULT_PORT: u16 = 8080;
}

/// Telephony media stream leg
pub mod telephony {
    /// Route the telephony provider connects to
    pub const DEFAULT_PATH: &str = "/media-stream";

    /// WebSocket sub-protocol the telephony peer must offer
    pub const SUBPROTOCOL: &str = "audio.stream.v1";

    /// Confidence tone played on stream start
    pub const TONE_DURATION_MS: u32 = 1000;
    pub const TONE_FREQUENCY_HZ: f32 = 440.0;
    pub const TONE_AMPLITUDE: f32 = 0.2;

    /// Outbound writer queue depth (messages). A full queue skips a pacing tick.
    pub const WRITER_CAPACITY: usize = 32;

    /// Inbound reader queue depth (messages)
    pub const INBOUND_CAPACITY: usize = 256;
}

/// AI realtime transport
pub mod realtime {
    pub const DEFAULT_URL: &str = "wss://api.openai.com/v1/realtime";
    pub const DEFAULT_MODEL: &str = "gpt-4o-realtime-preview";
    pub const DEFAULT_VOICE: &str = "alloy";

    pub const INPUT_FORMAT: &str = "pcm16";
    pub const INPUT_SAMPLE_RATE: u32 = 16000;
    pub const OUTPUT_FORMAT: &str = "pcm16";
    pub const OUTPUT_SAMPLE_RATE: u32 = 24000;

    pub const CONNECT_TIMEOUT_MS: u64 = 10_000;

    /// Server-side voice activity detection
    pub const VAD_THRESHOLD: f32 = 0.5;
    pub const VAD_PREFIX_PADDING_MS: u32 = 300;
    pub const VAD_SILENCE_DURATION_MS: u32 = 500;

    /// Reconnect backoff
    pub const RECONNECT_ATTEMPTS: u32 = 3;
    pub const RECONNECT_INITIAL_DELAY_MS: u64 = 500;
    pub const RECONNECT_MAX_DELAY_MS: u64 = 8000;
}

/// Local turn detection
pub mod turn {
    /// Peak amplitude (16-bit scale) that counts as speech
    pub const ENERGY_THRESHOLD: u16 = 1500;

    /// Consecutive loud frames before speech is considered heard (60 ms)
    pub const MIN_SPEECH_FRAMES: u32 = 3;

    /// Consecutive quiet frames that end an utterance (440 ms)
    pub const SILENCE_FRAMES: u32 = 22;

    /// Least audio appended since the last commit before committing again
    pub const MIN_COMMIT_MS: u32 = 100;

    /// Force AssistantSpeaking to clear if no end-of-response arrives
    pub const SAFETY_TIMEOUT_MS: u64 = 800;

    /// Give up waiting for a response after a local commit
    pub const COMMIT_TIMEOUT_MS: u64 = 2000;
}

/// Tools and instruction lookup
pub mod tools {
    pub const WEB_FETCH_TIMEOUT_SECS: u64 = 10;
    pub const WEB_FETCH_MAX_BYTES: usize = 16 * 1024;

    pub const INSTRUCTION_KEY_PARAMETER: &str = "assistant";
    pub const INSTRUCTION_LOOKUP_TIMEOUT_MS: u64 = 2000;
    pub const DEFAULT_INSTRUCTIONS: &str =
        "You are a helpful phone assistant. Keep answers short and conversational.";
}

//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use call_bridge_core::AiAudioFormat;

use crate::constants::{realtime, server, telephony, tools, turn};
use crate::ConfigError;

/// Runtime environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    /// Development mode - relaxed validation
    #[default]
    Development,
    /// Staging mode - stricter validation
    Staging,
    /// Production mode - all validations enforced
    Production,
}

impl RuntimeEnvironment {
    /// Check if strict validation should be applied
    pub fn is_strict(&self) -> bool {
        matches!(self, Self::Production | Self::Staging)
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub environment: RuntimeEnvironment,

    #[serde(default)]
    pub server: ServerConfig,

    /// Telephony media stream leg
    #[serde(default)]
    pub telephony: TelephonyConfig,

    /// AI realtime leg
    #[serde(default)]
    pub realtime: RealtimeConfig,

    /// Local turn detection and floor control
    #[serde(default)]
    pub turn: TurnConfig,

    #[serde(default)]
    pub tools: ToolsConfig,

    #[serde(default)]
    pub instructions: InstructionsConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server host
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    server::DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    server::DEFAULT_PORT
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Telephony media stream configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelephonyConfig {
    /// WebSocket route for the media stream
    #[serde(default = "default_telephony_path")]
    pub path: String,

    /// The one WebSocket sub-protocol the peer must offer
    #[serde(default = "default_subprotocol")]
    pub subprotocol: String,

    /// Accept handshakes without checking the sub-protocol
    #[serde(default)]
    pub accept_any_subprotocol: bool,

    /// Play a short tone as soon as the stream starts
    #[serde(default = "default_true")]
    pub confidence_tone: bool,

    #[serde(default = "default_tone_duration_ms")]
    pub tone_duration_ms: u32,

    #[serde(default = "default_tone_frequency_hz")]
    pub tone_frequency_hz: f32,

    #[serde(default = "default_tone_amplitude")]
    pub tone_amplitude: f32,

    /// Flush queued playback and send a clear event when the AI reports an interrupt
    #[serde(default = "default_true")]
    pub clear_on_interrupt: bool,

    #[serde(default = "default_writer_capacity")]
    pub writer_capacity: usize,

    #[serde(default = "default_inbound_capacity")]
    pub inbound_capacity: usize,
}

fn default_telephony_path() -> String {
    telephony::DEFAULT_PATH.to_string()
}

fn default_subprotocol() -> String {
    telephony::SUBPROTOCOL.to_string()
}

fn default_tone_duration_ms() -> u32 {
    telephony::TONE_DURATION_MS
}

fn default_tone_frequency_hz() -> f32 {
    telephony::TONE_FREQUENCY_HZ
}

fn default_tone_amplitude() -> f32 {
    telephony::TONE_AMPLITUDE
}

fn default_writer_capacity() -> usize {
    telephony::WRITER_CAPACITY
}

fn default_inbound_capacity() -> usize {
    telephony::INBOUND_CAPACITY
}

impl Default for TelephonyConfig {
    fn default() -> Self {
        Self {
            path: default_telephony_path(),
            subprotocol: default_subprotocol(),
            accept_any_subprotocol: false,
            confidence_tone: true,
            tone_duration_ms: default_tone_duration_ms(),
            tone_frequency_hz: default_tone_frequency_hz(),
            tone_amplitude: default_tone_amplitude(),
            clear_on_interrupt: true,
            writer_capacity: default_writer_capacity(),
            inbound_capacity: default_inbound_capacity(),
        }
    }
}

impl TelephonyConfig {
    /// Token the handshake must offer, or None when the check is switched off
    pub fn expected_subprotocol(&self) -> Option<&str> {
        (!self.accept_any_subprotocol).then_some(self.subprotocol.as_str())
    }
}

/// What to do with the telephony leg when the AI transport drops mid-call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectPolicy {
    /// Keep the caller connected; forwarding stays off until a reconnect succeeds
    #[default]
    KeepOpen,
    /// Close the telephony socket
    HangUp,
}

/// AI realtime transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    #[serde(default = "default_realtime_url")]
    pub url: String,

    #[serde(default = "default_realtime_model")]
    pub model: String,

    /// Bearer token; falls back to OPENAI_API_KEY
    #[serde(default = "default_api_key")]
    pub api_key: Option<String>,

    #[serde(default = "default_voice")]
    pub voice: String,

    /// Language or dialect the assistant must answer in
    #[serde(default)]
    pub language: Option<String>,

    #[serde(default = "default_input_format")]
    pub input_format: String,

    #[serde(default = "default_input_sample_rate")]
    pub input_sample_rate: u32,

    #[serde(default = "default_output_format")]
    pub output_format: String,

    #[serde(default = "default_output_sample_rate")]
    pub output_sample_rate: u32,

    /// Instructions for an assistant-first greeting. None waits for the caller.
    #[serde(default)]
    pub greeting: Option<String>,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default)]
    pub on_disconnect: DisconnectPolicy,

    #[serde(default)]
    pub reconnect: ReconnectConfig,

    #[serde(default)]
    pub vad: ServerVadConfig,
}

fn default_realtime_url() -> String {
    realtime::DEFAULT_URL.to_string()
}

fn default_realtime_model() -> String {
    realtime::DEFAULT_MODEL.to_string()
}

fn default_api_key() -> Option<String> {
    std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty())
}

fn default_voice() -> String {
    realtime::DEFAULT_VOICE.to_string()
}

fn default_input_format() -> String {
    realtime::INPUT_FORMAT.to_string()
}

fn default_input_sample_rate() -> u32 {
    realtime::INPUT_SAMPLE_RATE
}

fn default_output_format() -> String {
    realtime::OUTPUT_FORMAT.to_string()
}

fn default_output_sample_rate() -> u32 {
    realtime::OUTPUT_SAMPLE_RATE
}

fn default_connect_timeout_ms() -> u64 {
    realtime::CONNECT_TIMEOUT_MS
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            url: default_realtime_url(),
            model: default_realtime_model(),
            api_key: default_api_key(),
            voice: default_voice(),
            language: None,
            input_format: default_input_format(),
            input_sample_rate: default_input_sample_rate(),
            output_format: default_output_format(),
            output_sample_rate: default_output_sample_rate(),
            greeting: None,
            connect_timeout_ms: default_connect_timeout_ms(),
            on_disconnect: DisconnectPolicy::default(),
            reconnect: ReconnectConfig::default(),
            vad: ServerVadConfig::default(),
        }
    }
}

impl RealtimeConfig {
    /// Audio format sent to the AI
    pub fn input_audio(&self) -> Result<AiAudioFormat, ConfigError> {
        AiAudioFormat::from_parts(&self.input_format, self.input_sample_rate).map_err(|e| {
            ConfigError::InvalidValue {
                field: "realtime.input_format".to_string(),
                message: e.to_string(),
            }
        })
    }

    /// Audio format received from the AI
    pub fn output_audio(&self) -> Result<AiAudioFormat, ConfigError> {
        AiAudioFormat::from_parts(&self.output_format, self.output_sample_rate).map_err(|e| {
            ConfigError::InvalidValue {
                field: "realtime.output_format".to_string(),
                message: e.to_string(),
            }
        })
    }
}

/// Reconnect backoff for the AI transport
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Attempts after the first failure; 0 disables reconnecting
    #[serde(default = "default_reconnect_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_reconnect_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_reconnect_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_reconnect_attempts() -> u32 {
    realtime::RECONNECT_ATTEMPTS
}

fn default_reconnect_initial_delay_ms() -> u64 {
    realtime::RECONNECT_INITIAL_DELAY_MS
}

fn default_reconnect_max_delay_ms() -> u64 {
    realtime::RECONNECT_MAX_DELAY_MS
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_reconnect_attempts(),
            initial_delay_ms: default_reconnect_initial_delay_ms(),
            max_delay_ms: default_reconnect_max_delay_ms(),
        }
    }
}

/// Voice activity parameters declared to the AI transport
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerVadConfig {
    /// Ask the AI transport to run its own VAD
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Activation threshold (0.0 - 1.0)
    #[serde(default = "default_vad_threshold")]
    pub threshold: f32,

    /// Audio kept before detected speech
    #[serde(default = "default_vad_prefix_padding_ms")]
    pub prefix_padding_ms: u32,

    /// Silence that ends an utterance
    #[serde(default = "default_vad_silence_duration_ms")]
    pub silence_duration_ms: u32,

    /// Let the AI generate a response on its own after each utterance
    #[serde(default = "default_true")]
    pub create_response: bool,

    /// Let caller speech interrupt assistant playback
    #[serde(default = "default_true")]
    pub interrupt_response: bool,
}

fn default_vad_threshold() -> f32 {
    realtime::VAD_THRESHOLD
}

fn default_vad_prefix_padding_ms() -> u32 {
    realtime::VAD_PREFIX_PADDING_MS
}

fn default_vad_silence_duration_ms() -> u32 {
    realtime::VAD_SILENCE_DURATION_MS
}

impl Default for ServerVadConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: default_vad_threshold(),
            prefix_padding_ms: default_vad_prefix_padding_ms(),
            silence_duration_ms: default_vad_silence_duration_ms(),
            create_response: true,
            interrupt_response: true,
        }
    }
}

/// Which detector decides when the caller has finished speaking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum VadSource {
    /// Only the AI transport's VAD; the local detector never commits
    Server,
    /// Only the local energy detector
    Local,
    /// Server events take priority, local detector commits when they are absent
    #[default]
    Hybrid,
}

impl VadSource {
    pub fn local_commits(&self) -> bool {
        matches!(self, Self::Local | Self::Hybrid)
    }

    pub fn server_events(&self) -> bool {
        matches!(self, Self::Server | Self::Hybrid)
    }
}

/// Local turn detection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnConfig {
    #[serde(default)]
    pub vad_source: VadSource,

    /// Peak amplitude that counts as speech
    #[serde(default = "default_energy_threshold")]
    pub energy_threshold: u16,

    #[serde(default = "default_min_speech_frames")]
    pub min_speech_frames: u32,

    #[serde(default = "default_silence_frames")]
    pub silence_frames: u32,

    #[serde(default = "default_min_commit_ms")]
    pub min_commit_ms: u32,

    #[serde(default = "default_safety_timeout_ms")]
    pub safety_timeout_ms: u64,

    #[serde(default = "default_commit_timeout_ms")]
    pub commit_timeout_ms: u64,

    /// Loop caller audio back to the caller (diagnostics)
    #[serde(default)]
    pub echo_enabled: bool,
}

fn default_energy_threshold() -> u16 {
    turn::ENERGY_THRESHOLD
}

fn default_min_speech_frames() -> u32 {
    turn::MIN_SPEECH_FRAMES
}

fn default_silence_frames() -> u32 {
    turn::SILENCE_FRAMES
}

fn default_min_commit_ms() -> u32 {
    turn::MIN_COMMIT_MS
}

fn default_safety_timeout_ms() -> u64 {
    turn::SAFETY_TIMEOUT_MS
}

fn default_commit_timeout_ms() -> u64 {
    turn::COMMIT_TIMEOUT_MS
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            vad_source: VadSource::default(),
            energy_threshold: default_energy_threshold(),
            min_speech_frames: default_min_speech_frames(),
            silence_frames: default_silence_frames(),
            min_commit_ms: default_min_commit_ms(),
            safety_timeout_ms: default_safety_timeout_ms(),
            commit_timeout_ms: default_commit_timeout_ms(),
            echo_enabled: false,
        }
    }
}

/// Tool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Declare tools to the AI at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub web_fetch: WebFetchConfig,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            web_fetch: WebFetchConfig::default(),
        }
    }
}

/// Built-in web fetch tool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebFetchConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_web_fetch_timeout_secs")]
    pub timeout_secs: u64,

    /// Response bodies are truncated to this many bytes
    #[serde(default = "default_web_fetch_max_bytes")]
    pub max_bytes: usize,
}

fn default_web_fetch_timeout_secs() -> u64 {
    tools::WEB_FETCH_TIMEOUT_SECS
}

fn default_web_fetch_max_bytes() -> usize {
    tools::WEB_FETCH_MAX_BYTES
}

impl Default for WebFetchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_secs: default_web_fetch_timeout_secs(),
            max_bytes: default_web_fetch_max_bytes(),
        }
    }
}

/// Instruction lookup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstructionsConfig {
    /// Used when no key is supplied or the lookup comes back empty
    #[serde(default = "default_instructions")]
    pub default: String,

    /// Custom start parameter carrying the lookup key
    #[serde(default = "default_key_parameter")]
    pub key_parameter: String,

    /// Remote catalog base URL; keys are fetched from `{catalog_url}/{key}`
    #[serde(default)]
    pub catalog_url: Option<String>,

    #[serde(default = "default_lookup_timeout_ms")]
    pub lookup_timeout_ms: u64,

    /// Local key -> instructions table, consulted when no catalog is set
    #[serde(default)]
    pub entries: HashMap<String, String>,
}

fn default_instructions() -> String {
    tools::DEFAULT_INSTRUCTIONS.to_string()
}

fn default_key_parameter() -> String {
    tools::INSTRUCTION_KEY_PARAMETER.to_string()
}

fn default_lookup_timeout_ms() -> u64 {
    tools::INSTRUCTION_LOOKUP_TIMEOUT_MS
}

impl Default for InstructionsConfig {
    fn default() -> Self {
        Self {
            default: default_instructions(),
            key_parameter: default_key_parameter(),
            catalog_url: None,
            lookup_timeout_ms: default_lookup_timeout_ms(),
            entries: HashMap::new(),
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub log_json: bool,

    /// Install the Prometheus recorder and serve /metrics
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
            metrics_enabled: true,
        }
    }
}

fn default_true() -> bool {
    true
}

impl Settings {
    /// Create default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_server()?;
        self.validate_telephony()?;
        self.validate_realtime()?;
        self.validate_turn()?;
        Ok(())
    }

    fn validate_server(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.port".to_string(),
                message: "Port cannot be 0".to_string(),
            });
        }
        Ok(())
    }

    fn validate_telephony(&self) -> Result<(), ConfigError> {
        let t = &self.telephony;

        if !t.path.starts_with('/') {
            return Err(ConfigError::InvalidValue {
                field: "telephony.path".to_string(),
                message: format!("Must start with '/', got {}", t.path),
            });
        }

        if !t.accept_any_subprotocol {
            let token = t.subprotocol.trim();
            if token.is_empty() || token.contains(',') || token != t.subprotocol {
                return Err(ConfigError::InvalidValue {
                    field: "telephony.subprotocol".to_string(),
                    message: "Must be a single non-empty token".to_string(),
                });
            }
        }

        if !(0.0..=1.0).contains(&t.tone_amplitude) {
            return Err(ConfigError::InvalidValue {
                field: "telephony.tone_amplitude".to_string(),
                message: format!("Must be between 0.0 and 1.0, got {}", t.tone_amplitude),
            });
        }

        if t.writer_capacity == 0 || t.inbound_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "telephony.writer_capacity".to_string(),
                message: "Channel capacities must be at least 1".to_string(),
            });
        }

        Ok(())
    }

    fn validate_realtime(&self) -> Result<(), ConfigError> {
        let r = &self.realtime;

        if !(r.url.starts_with("ws://") || r.url.starts_with("wss://")) {
            return Err(ConfigError::InvalidValue {
                field: "realtime.url".to_string(),
                message: format!("Must be a ws:// or wss:// URL, got {}", r.url),
            });
        }

        r.input_audio()?;
        r.output_audio()?;

        if !(0.0..=1.0).contains(&r.vad.threshold) {
            return Err(ConfigError::InvalidValue {
                field: "realtime.vad.threshold".to_string(),
                message: format!("Must be between 0.0 and 1.0, got {}", r.vad.threshold),
            });
        }

        if r.reconnect.initial_delay_ms > r.reconnect.max_delay_ms {
            return Err(ConfigError::InvalidValue {
                field: "realtime.reconnect.initial_delay_ms".to_string(),
                message: "Initial delay exceeds max delay".to_string(),
            });
        }

        if self.environment.is_strict() && r.api_key.is_none() {
            return Err(ConfigError::MissingField("realtime.api_key".to_string()));
        }

        Ok(())
    }

    fn validate_turn(&self) -> Result<(), ConfigError> {
        let t = &self.turn;

        if t.energy_threshold == 0 {
            return Err(ConfigError::InvalidValue {
                field: "turn.energy_threshold".to_string(),
                message: "Threshold of 0 treats every frame as speech".to_string(),
            });
        }

        if t.silence_frames == 0 || t.min_speech_frames == 0 {
            return Err(ConfigError::InvalidValue {
                field: "turn.silence_frames".to_string(),
                message: "Frame counts must be at least 1".to_string(),
            });
        }

        if !(100..=10_000).contains(&t.safety_timeout_ms) {
            return Err(ConfigError::InvalidValue {
                field: "turn.safety_timeout_ms".to_string(),
                message: format!("Must be between 100 and 10000, got {}", t.safety_timeout_ms),
            });
        }

        Ok(())
    }
}

/// Load settings from `config/` relative to the working directory
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    load_settings_from(Path::new("config"), env)
}

/// Load settings from files in `dir` and the environment
///
/// Priority: env vars > {dir}/{env} > {dir}/default > defaults
pub fn load_settings_from(dir: &Path, env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::from(dir.join("default")).required(false));

    if let Some(env_name) = env {
        builder = builder.add_source(File::from(dir.join(env_name)).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("CALL_BRIDGE")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.telephony.path, "/media-stream");
        assert_eq!(settings.turn.vad_source, VadSource::Hybrid);
        assert_eq!(settings.realtime.on_disconnect, DisconnectPolicy::KeepOpen);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_audio_formats() {
        let settings = Settings::default();
        assert_eq!(
            settings.realtime.input_audio().unwrap(),
            AiAudioFormat::Pcm16(call_bridge_core::SampleRate::Hz16000)
        );
        assert_eq!(
            settings.realtime.output_audio().unwrap(),
            AiAudioFormat::Pcm16(call_bridge_core::SampleRate::Hz24000)
        );

        let mut settings = Settings::default();
        settings.realtime.output_sample_rate = 44100;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_turn_validation() {
        let mut settings = Settings::default();
        settings.turn.silence_frames = 0;
        assert!(settings.validate().is_err());

        settings.turn.silence_frames = 20;
        settings.turn.safety_timeout_ms = 50;
        assert!(settings.validate().is_err());

        settings.turn.safety_timeout_ms = 800;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_telephony_validation() {
        let mut settings = Settings::default();
        assert_eq!(settings.telephony.expected_subprotocol(), Some("audio.stream.v1"));

        settings.telephony.subprotocol = "audio.v1, audio.v2".to_string();
        assert!(settings.validate_telephony().is_err());
        settings.telephony.subprotocol = String::new();
        assert!(settings.validate_telephony().is_err());

        // Opting out makes the token irrelevant
        settings.telephony.accept_any_subprotocol = true;
        assert!(settings.validate_telephony().is_ok());
        assert_eq!(settings.telephony.expected_subprotocol(), None);

        settings.telephony.accept_any_subprotocol = false;
        settings.telephony.subprotocol = "audio.v1".to_string();
        assert!(settings.validate_telephony().is_ok());

        settings.telephony.path = "media".to_string();
        assert!(settings.validate_telephony().is_err());
    }

    #[test]
    fn test_strict_environment_requires_api_key() {
        let mut settings = Settings::default();
        settings.realtime.api_key = None;
        assert!(settings.validate().is_ok());

        settings.environment = RuntimeEnvironment::Production;
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::MissingField(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("default.toml"),
            r#"
[server]
port = 9090

[turn]
silence_frames = 25
vad_source = "local"

[realtime]
on_disconnect = "hang_up"
greeting = "Greet the caller."
"#,
        )
        .unwrap();

        let settings = load_settings_from(dir.path(), None).unwrap();
        assert_eq!(settings.server.port, 9090);
        assert_eq!(settings.turn.silence_frames, 25);
        assert_eq!(settings.turn.vad_source, VadSource::Local);
        assert_eq!(settings.realtime.on_disconnect, DisconnectPolicy::HangUp);
        assert_eq!(settings.realtime.greeting.as_deref(), Some("Greet the caller."));
        // Untouched sections keep defaults
        assert_eq!(settings.telephony.tone_duration_ms, 1000);
    }

    #[test]
    fn test_missing_files_fall_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_settings_from(dir.path(), Some("staging-nope")).unwrap();
        assert_eq!(settings.server.port, 8080);
    }
}

//! Realtime speech AI events
//!
//! Client events are what the bridge sends; server events are what it
//! reacts to. Every message is a JSON object tagged by `type`.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use call_bridge_config::{RealtimeConfig, ServerVadConfig};

use crate::TransportError;

/// Function declaration offered to the AI
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDeclaration {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolDeclaration {
    pub fn function(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            kind: "function".to_string(),
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// Server-side voice activity detection settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TurnDetection {
    #[serde(rename = "type")]
    pub kind: String,
    pub threshold: f32,
    pub prefix_padding_ms: u32,
    pub silence_duration_ms: u32,
    pub create_response: bool,
    pub interrupt_response: bool,
}

impl From<&ServerVadConfig> for TurnDetection {
    fn from(vad: &ServerVadConfig) -> Self {
        Self {
            kind: "server_vad".to_string(),
            threshold: vad.threshold,
            prefix_padding_ms: vad.prefix_padding_ms,
            silence_duration_ms: vad.silence_duration_ms,
            create_response: vad.create_response,
            interrupt_response: vad.interrupt_response,
        }
    }
}

/// Body of `session.update`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionConfig {
    pub modalities: Vec<String>,
    pub instructions: String,
    pub voice: String,
    pub input_audio_format: String,
    pub input_sample_rate: u32,
    pub output_audio_format: String,
    pub output_sample_rate: u32,
    /// Serialized as `null` to disable server turn detection
    pub turn_detection: Option<TurnDetection>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDeclaration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<String>,
}

impl SessionConfig {
    /// Session for one call from realtime settings and the composed instructions
    pub fn from_settings(
        config: &RealtimeConfig,
        instructions: String,
        tools: Vec<ToolDeclaration>,
    ) -> Result<Self, TransportError> {
        let input = config
            .input_audio()
            .map_err(|e| TransportError::Configuration(e.to_string()))?;
        let output = config
            .output_audio()
            .map_err(|e| TransportError::Configuration(e.to_string()))?;

        let tool_choice = (!tools.is_empty()).then(|| "auto".to_string());

        Ok(Self {
            modalities: vec!["audio".to_string(), "text".to_string()],
            instructions,
            voice: config.voice.clone(),
            input_audio_format: input.wire_name().to_string(),
            input_sample_rate: input.sample_rate().as_u32(),
            output_audio_format: output.wire_name().to_string(),
            output_sample_rate: output.sample_rate().as_u32(),
            turn_detection: config.vad.enabled.then(|| TurnDetection::from(&config.vad)),
            tools,
            tool_choice,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ResponseOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConversationItem {
    FunctionCallOutput { call_id: String, output: String },
}

/// Events sent to the AI
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "session.update")]
    SessionUpdate { session: SessionConfig },

    #[serde(rename = "input_audio_buffer.append")]
    AppendAudio { audio: String },

    #[serde(rename = "input_audio_buffer.commit")]
    CommitAudio,

    #[serde(rename = "response.create")]
    CreateResponse {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        response: Option<ResponseOptions>,
    },

    #[serde(rename = "conversation.item.create")]
    CreateItem { item: ConversationItem },
}

impl ClientEvent {
    pub fn append_audio(payload: &[u8]) -> Self {
        Self::AppendAudio {
            audio: BASE64.encode(payload),
        }
    }

    pub fn create_response() -> Self {
        Self::CreateResponse { response: None }
    }

    /// Response request carrying its own instructions, used for the greeting
    pub fn create_response_with(instructions: impl Into<String>) -> Self {
        Self::CreateResponse {
            response: Some(ResponseOptions {
                instructions: Some(instructions.into()),
            }),
        }
    }

    pub fn function_output(call_id: impl Into<String>, output: &Value) -> Self {
        Self::CreateItem {
            item: ConversationItem::FunctionCallOutput {
                call_id: call_id.into(),
                output: output.to_string(),
            },
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::SessionUpdate { .. } => "session.update",
            Self::AppendAudio { .. } => "input_audio_buffer.append",
            Self::CommitAudio => "input_audio_buffer.commit",
            Self::CreateResponse { .. } => "response.create",
            Self::CreateItem { .. } => "conversation.item.create",
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
pub struct ResponseInfo {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct OutputItem {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub call_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ErrorDetail {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

/// Events received from the AI
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "session.created")]
    SessionCreated {},

    #[serde(rename = "session.updated")]
    SessionUpdated {},

    #[serde(rename = "response.created")]
    ResponseCreated {
        #[serde(default)]
        response: ResponseInfo,
    },

    #[serde(rename = "response.done")]
    ResponseDone {
        #[serde(default)]
        response: ResponseInfo,
    },

    #[serde(rename = "response.audio.delta", alias = "response.output_audio.delta")]
    AudioDelta { delta: String },

    #[serde(rename = "response.audio.done", alias = "response.output_audio.done")]
    AudioDone {},

    #[serde(rename = "response.output_item.added")]
    OutputItemAdded { item: OutputItem },

    #[serde(rename = "response.function_call_arguments.delta")]
    FunctionCallArgumentsDelta { call_id: String, delta: String },

    #[serde(rename = "response.function_call_arguments.done")]
    FunctionCallArgumentsDone {
        call_id: String,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        arguments: Option<String>,
    },

    #[serde(rename = "input_audio_buffer.speech_started")]
    SpeechStarted {},

    #[serde(rename = "input_audio_buffer.speech_stopped")]
    SpeechStopped {},

    #[serde(rename = "input_audio_buffer.committed")]
    InputCommitted {},

    #[serde(rename = "error")]
    Error { error: ErrorDetail },

    #[serde(other)]
    Other,
}

impl ServerEvent {
    pub fn parse(text: &str) -> Result<Self, TransportError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Decode the base64 payload of an audio delta
pub fn decode_audio(delta: &str) -> Result<Vec<u8>, TransportError> {
    Ok(BASE64.decode(delta.as_bytes())?)
}

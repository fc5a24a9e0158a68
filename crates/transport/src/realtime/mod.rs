//! Realtime speech AI leg

pub mod client;
pub mod protocol;
pub mod tool_calls;

pub use client::{AiConnector, AiEvent, AiLink, AiPeer, RealtimeConnector, DEFAULT_LINK_CAPACITY};
pub use protocol::{
    decode_audio, ClientEvent, ConversationItem, ErrorDetail, OutputItem, ResponseInfo,
    ResponseOptions, ServerEvent, SessionConfig, ToolDeclaration, TurnDetection,
};
pub use tool_calls::{CompletedToolCall, ToolCallAccumulator, ToolCallError};

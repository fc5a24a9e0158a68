//! Wire protocols for both legs of the call bridge
//!
//! - `telephony`: media stream events from and to the telephony provider
//! - `realtime`: session configuration, events and client for the speech AI

pub mod realtime;
pub mod telephony;

pub use realtime::{
    AiConnector, AiEvent, AiLink, AiPeer, ClientEvent, CompletedToolCall, RealtimeConnector,
    ServerEvent, SessionConfig, ToolCallAccumulator, ToolCallError,
};
pub use telephony::{
    clear_message, media_message, negotiate_subprotocol, parse_event, StreamStart,
    TelephonyEvent,
};

use thiserror::Error;

/// Transport errors
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Handshake rejected: {0}")]
    HandshakeRejected(String),

    #[error("Malformed message: {0}")]
    Malformed(String),

    #[error("Invalid audio frame: {0}")]
    InvalidFrame(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection closed")]
    Closed,

    #[error("Send queue full")]
    Backpressure,

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        TransportError::Malformed(err.to_string())
    }
}

impl From<base64::DecodeError> for TransportError {
    fn from(err: base64::DecodeError) -> Self {
        TransportError::InvalidFrame(format!("bad base64: {}", err))
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match err {
            WsError::ConnectionClosed | WsError::AlreadyClosed => TransportError::Closed,
            other => TransportError::ConnectionFailed(other.to_string()),
        }
    }
}

impl From<call_bridge_core::Error> for TransportError {
    fn from(err: call_bridge_core::Error) -> Self {
        match err {
            call_bridge_core::Error::InvalidFrame(reason) => TransportError::InvalidFrame(reason),
            other => TransportError::Configuration(other.to_string()),
        }
    }
}

impl From<url::ParseError> for TransportError {
    fn from(err: url::ParseError) -> Self {
        TransportError::Configuration(err.to_string())
    }
}

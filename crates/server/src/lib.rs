//! Call Bridge Server
//!
//! Accepts telephony media streams over WebSocket and bridges each call to a
//! realtime speech AI session.

pub mod http;
pub mod metrics;
pub mod session;
pub mod state;
pub mod telephony;

pub use http::create_router;
pub use metrics::init_metrics;
pub use session::{CallSession, SessionStats};
pub use state::{AppState, CallInfo, CallRegistry};

use thiserror::Error;

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Handshake rejected: {0}")]
    Handshake(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<call_bridge_transport::TransportError> for ServerError {
    fn from(err: call_bridge_transport::TransportError) -> Self {
        match err {
            call_bridge_transport::TransportError::HandshakeRejected(msg) => {
                ServerError::Handshake(msg)
            },
            call_bridge_transport::TransportError::Configuration(msg) => ServerError::Config(msg),
            other => ServerError::Transport(other.to_string()),
        }
    }
}

impl From<call_bridge_config::ConfigError> for ServerError {
    fn from(err: call_bridge_config::ConfigError) -> Self {
        ServerError::Config(err.to_string())
    }
}

impl From<call_bridge_core::Error> for ServerError {
    fn from(err: call_bridge_core::Error) -> Self {
        ServerError::Config(err.to_string())
    }
}

impl From<ServerError> for axum::http::StatusCode {
    fn from(err: ServerError) -> Self {
        match err {
            ServerError::Handshake(_) => axum::http::StatusCode::BAD_REQUEST,
            ServerError::InvalidRequest(_) => axum::http::StatusCode::BAD_REQUEST,
            ServerError::Config(_) => axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::Transport(_) => axum::http::StatusCode::BAD_GATEWAY,
            ServerError::Internal(_) => axum::http::StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use call_bridge_transport::TransportError;

    #[test]
    fn test_status_mapping() {
        let err: ServerError = TransportError::HandshakeRejected("no protocol".into()).into();
        assert_eq!(StatusCode::from(err), StatusCode::BAD_REQUEST);

        let err: ServerError = TransportError::Closed.into();
        assert_eq!(StatusCode::from(err), StatusCode::BAD_GATEWAY);

        assert_eq!(
            StatusCode::from(ServerError::Internal("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}

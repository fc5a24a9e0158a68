//! Telephony WebSocket endpoint
//!
//! Validates the handshake, then splits the socket into a reader task and a
//! writer task joined to the call actor by bounded channels.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{header::SEC_WEBSOCKET_PROTOCOL, HeaderMap, StatusCode},
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use call_bridge_transport::negotiate_subprotocol;

use crate::session::CallSession;
use crate::state::AppState;

/// Upgrade handler for the media stream route
///
/// The sub-protocol check runs before the upgrade so a rejected caller gets
/// a plain 400 and no call is created.
pub async fn media_stream_handler(
    headers: HeaderMap,
    State(state): State<AppState>,
    ws: Option<WebSocketUpgrade>,
) -> Result<Response, StatusCode> {
    let offered = headers
        .get(SEC_WEBSOCKET_PROTOCOL)
        .and_then(|v| v.to_str().ok());
    let expected = state.settings.telephony.expected_subprotocol();

    let selected = negotiate_subprotocol(offered, expected).map_err(|e| {
        tracing::warn!(error = %e, "Rejecting media stream handshake");
        StatusCode::BAD_REQUEST
    })?;

    let ws = ws.ok_or(StatusCode::UPGRADE_REQUIRED)?;
    let ws = match selected {
        Some(protocol) => ws.protocols([protocol]),
        None => ws,
    };

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state)))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let telephony = &state.settings.telephony;
    let (inbound_tx, inbound_rx) = mpsc::channel::<String>(telephony.inbound_capacity);
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<String>(telephony.writer_capacity);

    let session = match CallSession::new(&state, outbound_tx) {
        Ok(session) => session,
        Err(e) => {
            tracing::error!(error = %e, "Failed to create call session");
            return;
        },
    };
    let call_id = session.id().to_string();

    let (mut sender, mut receiver) = socket.split();

    let writer = tokio::spawn(async move {
        while let Some(text) = outbound_rx.recv().await {
            if let Err(e) = sender.send(Message::Text(text)).await {
                tracing::debug!(error = %e, "Telephony socket write failed");
                break;
            }
        }
        let _ = sender.close().await;
    });

    let reader_call_id = call_id.clone();
    let reader = tokio::spawn(async move {
        while let Some(message) = receiver.next().await {
            match message {
                Ok(Message::Text(text)) => {
                    if inbound_tx.send(text).await.is_err() {
                        break;
                    }
                },
                Ok(Message::Close(_)) => break,
                Ok(_) => {},
                Err(e) => {
                    tracing::debug!(call_id = %reader_call_id, error = %e, "Telephony socket read failed");
                    break;
                },
            }
        }
    });

    let stats = session.run(inbound_rx).await;
    reader.abort();
    let _ = writer.await;

    tracing::debug!(call_id = %call_id, ?stats, "Telephony socket closed");
}

//! Realtime AI connection
//!
//! `AiConnector` opens one session per call. The returned `AiLink` is a pair
//! of bounded channels serviced by a socket task, so the call actor never
//! awaits the network.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::AbortHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header::AUTHORIZATION, HeaderValue, Request};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::Instrument;
use url::Url;

use call_bridge_config::RealtimeConfig;

use super::protocol::{ClientEvent, ServerEvent, SessionConfig};
use crate::TransportError;

/// Commands buffered toward the AI: a few seconds of 20 ms appends
pub const DEFAULT_LINK_CAPACITY: usize = 256;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone, PartialEq)]
pub enum AiEvent {
    Message(ServerEvent),
    /// The connection is gone; no further events follow
    Closed { reason: String },
}

/// Call-side handle of an AI session
#[derive(Debug)]
pub struct AiLink {
    commands: mpsc::Sender<ClientEvent>,
    events: mpsc::Receiver<AiEvent>,
    /// Socket task servicing the peer side, when there is one
    task: Option<AbortHandle>,
}

/// Socket-side handle of an AI session
#[derive(Debug)]
pub struct AiPeer {
    pub commands: mpsc::Receiver<ClientEvent>,
    pub events: mpsc::Sender<AiEvent>,
}

impl AiLink {
    pub fn channel(capacity: usize) -> (AiLink, AiPeer) {
        let (command_tx, command_rx) = mpsc::channel(capacity);
        let (event_tx, event_rx) = mpsc::channel(capacity);
        (
            AiLink {
                commands: command_tx,
                events: event_rx,
                task: None,
            },
            AiPeer {
                commands: command_rx,
                events: event_tx,
            },
        )
    }

    /// Queue an event without waiting
    pub fn send(&self, event: ClientEvent) -> Result<(), TransportError> {
        self.commands.try_send(event).map_err(|e| match e {
            TrySendError::Full(_) => TransportError::Backpressure,
            TrySendError::Closed(_) => TransportError::Closed,
        })
    }

    pub async fn recv(&mut self) -> Option<AiEvent> {
        self.events.recv().await
    }

    /// Tear the session down now, without waiting for the socket task to drain
    pub fn close(self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }
}

#[async_trait]
pub trait AiConnector: Send + Sync {
    /// Open a session and send its configuration
    async fn connect(&self, session: SessionConfig) -> Result<AiLink, TransportError>;
}

/// WebSocket connector for the realtime API
#[derive(Debug, Clone)]
pub struct RealtimeConnector {
    url: Url,
    api_key: Option<String>,
    connect_timeout: Duration,
    capacity: usize,
}

impl RealtimeConnector {
    pub fn new(config: &RealtimeConfig) -> Result<Self, TransportError> {
        let mut url = Url::parse(&config.url)?;
        match url.scheme() {
            "ws" | "wss" => {},
            other => {
                return Err(TransportError::Configuration(format!(
                    "realtime url scheme must be ws or wss, got {}",
                    other
                )))
            },
        }
        if !config.model.is_empty() && !url.query_pairs().any(|(k, _)| k == "model") {
            url.query_pairs_mut().append_pair("model", &config.model);
        }

        Ok(Self {
            url,
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
            capacity: DEFAULT_LINK_CAPACITY,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    fn request(&self) -> Result<Request<()>, TransportError> {
        let mut request = self.url.as_str().into_client_request()?;
        let headers = request.headers_mut();
        if let Some(key) = &self.api_key {
            let value = HeaderValue::from_str(&format!("Bearer {}", key))
                .map_err(|e| TransportError::Configuration(format!("api key: {}", e)))?;
            headers.insert(AUTHORIZATION, value);
        }
        headers.insert("openai-beta", HeaderValue::from_static("realtime=v1"));
        Ok(request)
    }
}

#[async_trait]
impl AiConnector for RealtimeConnector {
    async fn connect(&self, session: SessionConfig) -> Result<AiLink, TransportError> {
        let request = self.request()?;
        let host = self.url.host_str().unwrap_or_default().to_string();

        let (mut socket, _response) =
            tokio::time::timeout(self.connect_timeout, connect_async(request))
                .await
                .map_err(|_| TransportError::Timeout(format!("connecting to {}", host)))??;

        let update = serde_json::to_string(&ClientEvent::SessionUpdate { session })?;
        socket.send(Message::Text(update)).await?;
        tracing::info!(host = %host, "Connected to realtime AI");

        let (mut link, peer) = AiLink::channel(self.capacity);
        let task = tokio::spawn(run_socket(socket, peer).in_current_span());
        link.task = Some(task.abort_handle());
        Ok(link)
    }
}

/// Pump commands out and events in until either side goes away
async fn run_socket(socket: WsStream, peer: AiPeer) {
    let AiPeer {
        mut commands,
        events,
    } = peer;
    let (mut sink, mut stream) = socket.split();

    let reason = loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(event) => {
                    let text = match serde_json::to_string(&event) {
                        Ok(text) => text,
                        Err(e) => {
                            tracing::warn!(kind = event.kind(), error = %e, "Failed to encode AI event");
                            continue;
                        },
                    };
                    if let Err(e) = sink.send(Message::Text(text)).await {
                        break format!("send failed: {}", e);
                    }
                },
                None => {
                    // Call ended
                    let _ = sink.send(Message::Close(None)).await;
                    return;
                },
            },
            message = stream.next() => match message {
                Some(Ok(Message::Text(text))) => match ServerEvent::parse(&text) {
                    Ok(event) => {
                        if events.send(AiEvent::Message(event)).await.is_err() {
                            let _ = sink.send(Message::Close(None)).await;
                            return;
                        }
                    },
                    Err(e) => tracing::warn!(error = %e, "Dropping malformed AI event"),
                },
                Some(Ok(Message::Close(frame))) => {
                    break match frame {
                        Some(frame) => format!("closed by peer ({}): {}", u16::from(frame.code), frame.reason),
                        None => "closed by peer".to_string(),
                    };
                },
                Some(Ok(_)) => {},
                Some(Err(e)) => break e.to_string(),
                None => break "stream ended".to_string(),
            },
        }
    };

    tracing::debug!(reason = %reason, "Realtime AI socket finished");
    let _ = events.send(AiEvent::Closed { reason }).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn test_connector_url() {
        let config = RealtimeConfig::default();
        let connector = RealtimeConnector::new(&config).unwrap();
        assert_eq!(
            connector.url().as_str(),
            "wss://api.openai.com/v1/realtime?model=gpt-4o-realtime-preview"
        );

        let bad = RealtimeConfig {
            url: "https://api.openai.com/v1/realtime".to_string(),
            ..RealtimeConfig::default()
        };
        assert!(matches!(
            RealtimeConnector::new(&bad),
            Err(TransportError::Configuration(_))
        ));
    }

    #[test]
    fn test_request_headers() {
        let config = RealtimeConfig {
            api_key: Some("sk-test".to_string()),
            ..RealtimeConfig::default()
        };
        let request = RealtimeConnector::new(&config).unwrap().request().unwrap();
        assert_eq!(request.headers()[AUTHORIZATION], "Bearer sk-test");
        assert_eq!(request.headers()["openai-beta"], "realtime=v1");
    }

    #[tokio::test]
    async fn test_link_backpressure() {
        let (link, mut peer) = AiLink::channel(1);
        link.send(ClientEvent::CommitAudio).unwrap();
        assert!(matches!(
            link.send(ClientEvent::CommitAudio),
            Err(TransportError::Backpressure)
        ));

        assert_eq!(peer.commands.recv().await, Some(ClientEvent::CommitAudio));
        drop(peer);
        assert!(matches!(
            link.send(ClientEvent::CommitAudio),
            Err(TransportError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_connect_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();

            let first = ws.next().await.unwrap().unwrap();
            let value: serde_json::Value = serde_json::from_str(first.to_text().unwrap()).unwrap();
            assert_eq!(value["type"], "session.update");

            ws.send(Message::Text(r#"{"type":"input_audio_buffer.speech_started"}"#.into()))
                .await
                .unwrap();
            ws.send(Message::Text("not json".into())).await.unwrap();

            let next = ws.next().await.unwrap().unwrap();
            let value: serde_json::Value = serde_json::from_str(next.to_text().unwrap()).unwrap();
            assert_eq!(value["type"], "input_audio_buffer.commit");
            ws.close(None).await.unwrap();
        });

        let config = RealtimeConfig {
            url: format!("ws://{}/v1/realtime", addr),
            ..RealtimeConfig::default()
        };
        let connector = RealtimeConnector::new(&config).unwrap();
        let session = SessionConfig::from_settings(&config, "hi".into(), Vec::new()).unwrap();
        let mut link = connector.connect(session).await.unwrap();

        assert_eq!(
            link.recv().await,
            Some(AiEvent::Message(ServerEvent::SpeechStarted {}))
        );
        link.send(ClientEvent::CommitAudio).unwrap();
        assert!(matches!(link.recv().await, Some(AiEvent::Closed { .. })));

        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_close_aborts_socket_task() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            let first = ws.next().await.unwrap().unwrap();
            assert!(first.to_text().unwrap().contains("session.update"));
            // The socket is dropped, not closed with a handshake
            ws.next().await
        });

        let config = RealtimeConfig {
            url: format!("ws://{}/v1/realtime", addr),
            ..RealtimeConfig::default()
        };
        let connector = RealtimeConnector::new(&config).unwrap();
        let session = SessionConfig::from_settings(&config, "hi".into(), Vec::new()).unwrap();
        let link = connector.connect(session).await.unwrap();
        link.close();

        let next = tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap();
        assert!(!matches!(next, Some(Ok(Message::Close(_)))));
        assert!(!matches!(next, Some(Ok(Message::Text(_)))));
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let config = RealtimeConfig {
            url: format!("ws://{}/", addr),
            connect_timeout_ms: 500,
            ..RealtimeConfig::default()
        };
        let connector = RealtimeConnector::new(&config).unwrap();
        let session = SessionConfig::from_settings(&config, "hi".into(), Vec::new()).unwrap();
        assert!(connector.connect(session).await.is_err());
    }
}

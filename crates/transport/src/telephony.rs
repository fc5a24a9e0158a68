//! Telephony media stream protocol
//!
//! JSON messages tagged by `event`. Inbound: `connected`, `start`, `media`,
//! `stop`, plus informational `mark` and `dtmf`. Outbound: `media` frames
//! and `clear` to flush the provider's playback buffer.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use call_bridge_core::audio::telephony::FRAME_BYTES;
use call_bridge_core::{AudioEncoding, AudioFrame, Direction};

use crate::TransportError;

/// Stream metadata from the `start` event
#[derive(Debug, Clone, PartialEq)]
pub struct StreamStart {
    /// Identifier every outbound message must carry
    pub stream_sid: String,
    pub call_sid: Option<String>,
    /// Caller-supplied parameters, values stringified
    pub parameters: HashMap<String, String>,
}

/// Parsed inbound telephony event
#[derive(Debug, Clone, PartialEq)]
pub enum TelephonyEvent {
    Connected,
    Start(StreamStart),
    /// One validated 20 ms μ-law frame headed for the AI
    Media(AudioFrame),
    Stop,
    Mark(String),
    Dtmf(String),
    /// Event kind this bridge does not handle
    Ignored,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
enum InboundMessage {
    Connected {},
    Start {
        #[serde(rename = "streamSid", default)]
        stream_sid: Option<String>,
        start: StartPayload,
    },
    Media {
        media: MediaPayload,
    },
    Stop {},
    Mark {
        mark: MarkPayload,
    },
    Dtmf {
        dtmf: DtmfPayload,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartPayload {
    #[serde(default)]
    stream_sid: Option<String>,
    #[serde(default)]
    call_sid: Option<String>,
    #[serde(default)]
    custom_parameters: HashMap<String, Value>,
}

#[derive(Debug, Deserialize)]
struct MediaPayload {
    #[serde(default)]
    track: Option<String>,
    /// Per-track frame counter, sent as a decimal string
    #[serde(default)]
    chunk: Option<String>,
    payload: String,
}

#[derive(Debug, Deserialize)]
struct MarkPayload {
    name: String,
}

#[derive(Debug, Deserialize)]
struct DtmfPayload {
    digit: String,
}

#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
enum OutboundMessage<'a> {
    Media {
        #[serde(rename = "streamSid")]
        stream_sid: &'a str,
        media: OutboundMedia,
    },
    Clear {
        #[serde(rename = "streamSid")]
        stream_sid: &'a str,
    },
}

#[derive(Debug, Serialize)]
struct OutboundMedia {
    payload: String,
}

/// Parse one inbound text message.
///
/// Non-JSON or structurally wrong messages give `Malformed`; media payloads
/// that are not exactly one frame give `InvalidFrame`.
pub fn parse_event(text: &str) -> Result<TelephonyEvent, TransportError> {
    let message: InboundMessage = serde_json::from_str(text)?;

    Ok(match message {
        InboundMessage::Connected {} => TelephonyEvent::Connected,
        InboundMessage::Start { stream_sid, start } => {
            let stream_sid = start
                .stream_sid
                .or(stream_sid)
                .filter(|s| !s.is_empty())
                .ok_or_else(|| TransportError::Malformed("start without streamSid".into()))?;
            let parameters = start
                .custom_parameters
                .into_iter()
                .map(|(k, v)| match v {
                    Value::String(s) => (k, s),
                    other => (k, other.to_string()),
                })
                .collect();
            TelephonyEvent::Start(StreamStart {
                stream_sid,
                call_sid: start.call_sid,
                parameters,
            })
        },
        InboundMessage::Media { media } => {
            if matches!(media.track.as_deref(), Some(track) if track != "inbound") {
                return Ok(TelephonyEvent::Ignored);
            }
            let payload = Bytes::from(BASE64.decode(media.payload.as_bytes())?);
            let sequence = media
                .chunk
                .as_deref()
                .and_then(|c| c.parse().ok())
                .unwrap_or(0);
            TelephonyEvent::Media(AudioFrame::telephony(payload, Direction::ToAi, sequence)?)
        },
        InboundMessage::Stop {} => TelephonyEvent::Stop,
        InboundMessage::Mark { mark } => TelephonyEvent::Mark(mark.name),
        InboundMessage::Dtmf { dtmf } => TelephonyEvent::Dtmf(dtmf.digit),
        InboundMessage::Unknown => TelephonyEvent::Ignored,
    })
}

/// Serialize one outbound audio frame
pub fn media_message(stream_sid: &str, frame: &AudioFrame) -> Result<String, TransportError> {
    if frame.direction != Direction::ToTelephony
        || frame.encoding != AudioEncoding::Mulaw
        || frame.payload().len() != FRAME_BYTES
    {
        return Err(TransportError::InvalidFrame(format!(
            "outbound frame of {} {:?} bytes headed {:?}",
            frame.payload().len(),
            frame.encoding,
            frame.direction
        )));
    }
    let message = OutboundMessage::Media {
        stream_sid,
        media: OutboundMedia {
            payload: BASE64.encode(frame.payload()),
        },
    };
    Ok(serde_json::to_string(&message)?)
}

/// Ask the provider to drop audio it has buffered for playback
pub fn clear_message(stream_sid: &str) -> Result<String, TransportError> {
    Ok(serde_json::to_string(&OutboundMessage::Clear { stream_sid })?)
}

/// Check the `Sec-WebSocket-Protocol` offer against the single expected token.
///
/// Returns the protocol to select in the response, if any.
pub fn negotiate_subprotocol(
    offered: Option<&str>,
    expected: Option<&str>,
) -> Result<Option<String>, TransportError> {
    let Some(expected) = expected else {
        return Ok(None);
    };

    let offered = offered.unwrap_or("");
    if offered.split(',').map(str::trim).any(|p| p == expected) {
        Ok(Some(expected.to_string()))
    } else {
        Err(TransportError::HandshakeRejected(format!(
            "expected sub-protocol {}, offered {:?}",
            expected, offered
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn media_json(len: usize) -> String {
        format!(
            r#"{{"event":"media","sequenceNumber":"4","media":{{"track":"inbound","chunk":"2","timestamp":"40","payload":"{}"}},"streamSid":"MZ1"}}"#,
            BASE64.encode(vec![0xFFu8; len])
        )
    }

    #[test]
    fn test_parse_start() {
        let text = r#"{
            "event": "start",
            "sequenceNumber": "1",
            "start": {
                "accountSid": "AC1",
                "streamSid": "MZ1",
                "callSid": "CA1",
                "tracks": ["inbound"],
                "customParameters": {"assistant": "front-desk", "attempt": 2},
                "mediaFormat": {"encoding": "audio/x-mulaw", "sampleRate": 8000, "channels": 1}
            },
            "streamSid": "MZ1"
        }"#;

        let TelephonyEvent::Start(start) = parse_event(text).unwrap() else {
            panic!("expected start");
        };
        assert_eq!(start.stream_sid, "MZ1");
        assert_eq!(start.call_sid.as_deref(), Some("CA1"));
        assert_eq!(start.parameters["assistant"], "front-desk");
        assert_eq!(start.parameters["attempt"], "2");
    }

    #[test]
    fn test_start_requires_stream_sid() {
        let text = r#"{"event":"start","start":{"callSid":"CA1"}}"#;
        assert!(matches!(parse_event(text), Err(TransportError::Malformed(_))));
    }

    #[test]
    fn test_parse_media_validates_length() {
        match parse_event(&media_json(160)).unwrap() {
            TelephonyEvent::Media(frame) => {
                assert_eq!(frame.payload().len(), 160);
                assert_eq!(frame.direction, Direction::ToAi);
                assert_eq!(frame.sequence, 2);
            },
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(
            parse_event(&media_json(80)),
            Err(TransportError::InvalidFrame(_))
        ));

        let bad_base64 = r#"{"event":"media","media":{"payload":"@@@"}}"#;
        assert!(matches!(parse_event(bad_base64), Err(TransportError::InvalidFrame(_))));
    }

    #[test]
    fn test_parse_misc_events() {
        assert_eq!(parse_event(r#"{"event":"connected","protocol":"Call","version":"1.0.0"}"#).unwrap(), TelephonyEvent::Connected);
        assert_eq!(parse_event(r#"{"event":"stop","stop":{"callSid":"CA1"}}"#).unwrap(), TelephonyEvent::Stop);
        assert_eq!(
            parse_event(r#"{"event":"mark","mark":{"name":"greeting"}}"#).unwrap(),
            TelephonyEvent::Mark("greeting".into())
        );
        assert_eq!(
            parse_event(r#"{"event":"dtmf","dtmf":{"track":"inbound_track","digit":"5"}}"#).unwrap(),
            TelephonyEvent::Dtmf("5".into())
        );
        assert_eq!(parse_event(r#"{"event":"something-new"}"#).unwrap(), TelephonyEvent::Ignored);
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(parse_event("not json"), Err(TransportError::Malformed(_))));
        assert!(matches!(parse_event(r#"{"no_event":1}"#), Err(TransportError::Malformed(_))));
    }

    #[test]
    fn test_outbound_media() {
        let frame = AudioFrame::telephony(Bytes::from(vec![0xFF; 160]), Direction::ToTelephony, 7).unwrap();
        let json = media_message("MZ1", &frame).unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["event"], "media");
        assert_eq!(value["streamSid"], "MZ1");
        let payload = BASE64.decode(value["media"]["payload"].as_str().unwrap()).unwrap();
        assert_eq!(payload.len(), 160);

        // Inbound frames are never sent back out as media
        let inbound = AudioFrame::telephony(Bytes::from(vec![0xFF; 160]), Direction::ToAi, 0).unwrap();
        assert!(matches!(
            media_message("MZ1", &inbound),
            Err(TransportError::InvalidFrame(_))
        ));
    }

    #[test]
    fn test_outbound_clear() {
        let clear: Value = serde_json::from_str(&clear_message("MZ1").unwrap()).unwrap();
        assert_eq!(clear, serde_json::json!({"event": "clear", "streamSid": "MZ1"}));
    }

    #[test]
    fn test_subprotocol_negotiation() {
        assert_eq!(negotiate_subprotocol(None, None).unwrap(), None);
        assert_eq!(negotiate_subprotocol(Some("anything"), None).unwrap(), None);
        assert_eq!(
            negotiate_subprotocol(Some("audio.v1"), Some("audio.v1")).unwrap(),
            Some("audio.v1".to_string())
        );
        assert_eq!(
            negotiate_subprotocol(Some("chat, audio.v1"), Some("audio.v1")).unwrap(),
            Some("audio.v1".to_string())
        );
        assert!(negotiate_subprotocol(Some("audio.v2"), Some("audio.v1")).is_err());
        assert!(negotiate_subprotocol(None, Some("audio.v1")).is_err());
    }
}

use serde::{Deserialize, Serialize};

use crate::chat::ChatMessage;
use crate::event::RoomEvent;
use crate::presence::{ConnectionState, PresenceSnapshot};
use crate::room::types::RoomResponse;
use crate::signaling::SignalKind;

/// Client-to-server WebSocket frames
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientFrame {
    /// Post a chat message to the room
    Chat { text: String },
    /// Relay a session-negotiation message to one other member
    Signal {
        to_user: String,
        kind: SignalKind,
        payload: String,
        seq: u64,
    },
    /// Liveness ping; absence past the timeout demotes presence
    Heartbeat,
    EnableVideo,
    DisableVideo,
    SetMuted { muted: bool },
    /// Explicit leave; closing the socket has the same effect
    Leave,
}

/// Server-to-client WebSocket frames
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerFrame {
    /// Initial snapshot sent right after the connection is established
    Welcome {
        room: RoomResponse,
        presence: Vec<PresenceSnapshot>,
    },
    Chat { message: ChatMessage },
    Presence {
        user_id: String,
        state: ConnectionState,
    },
    /// Room lifecycle events (joins, leaves, host changes, deactivation)
    Event { event: RoomEvent },
    Error { message: String },
}

impl ServerFrame {
    pub fn chat(message: ChatMessage) -> Self {
        Self::Chat { message }
    }

    pub fn presence(user_id: String, state: ConnectionState) -> Self {
        Self::Presence { user_id, state }
    }

    pub fn event(event: RoomEvent) -> Self {
        Self::Event { event }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Wire encoding; infallible for the closed frame set
    pub fn encode(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"type":"ERROR","message":"frame encoding failed"}"#.to_string()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_client_frame_round_trip() {
        let frames = vec![
            r#"{"type":"CHAT","text":"hello"}"#,
            r#"{"type":"SIGNAL","to_user":"b","kind":"offer","payload":"{}","seq":0}"#,
            r#"{"type":"HEARTBEAT"}"#,
            r#"{"type":"ENABLE_VIDEO"}"#,
            r#"{"type":"DISABLE_VIDEO"}"#,
            r#"{"type":"SET_MUTED","muted":true}"#,
            r#"{"type":"LEAVE"}"#,
        ];

        for raw in frames {
            let frame: ClientFrame = serde_json::from_str(raw).unwrap();
            let encoded = serde_json::to_string(&frame).unwrap();
            let back: ClientFrame = serde_json::from_str(&encoded).unwrap();
            assert_eq!(
                std::mem::discriminant(&frame),
                std::mem::discriminant(&back)
            );
        }
    }

    #[test]
    fn test_unknown_client_frame_rejected() {
        let result = serde_json::from_str::<ClientFrame>(r#"{"type":"DANCE"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_server_frame_encoding() {
        let frame = ServerFrame::presence("u-1".to_string(), ConnectionState::Connected);
        let encoded = frame.encode();
        assert!(encoded.contains(r#""type":"PRESENCE""#));
        assert!(encoded.contains(r#""state":"connected""#));

        let event = ServerFrame::event(RoomEvent::RoomDeactivated {
            room_id: Uuid::new_v4(),
        });
        assert!(event.encode().contains(r#""type":"EVENT""#));

        let error = ServerFrame::error("nope");
        assert!(error.encode().contains(r#""type":"ERROR""#));
    }
}

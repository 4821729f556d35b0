//! Shared wire-protocol definitions for the tandem relay and its clients.
//! Keeping the schema in one dependency-light crate means the relay and the
//! client can never drift apart on message shapes.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Ephemeral identity assigned by the relay for the lifetime of one
/// signaling connection. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(pub Uuid);

impl PeerId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Which participant initiates negotiation. Assigned explicitly by the
/// relay in `PairFound`; clients never infer their role from id equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Role {
    Host,
    Guest,
}

impl Role {
    pub fn is_host(self) -> bool {
        matches!(self, Role::Host)
    }
}

/// A negotiation artifact. Opaque to the relay: routed by session
/// membership, never inspected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "signalType", rename_all = "camelCase")]
pub enum SignalPayload {
    Offer { sdp: String },
    Answer { sdp: String },
    IceCandidate { candidate: String },
}

impl SignalPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            SignalPayload::Offer { .. } => "offer",
            SignalPayload::Answer { .. } => "answer",
            SignalPayload::IceCandidate { .. } => "iceCandidate",
        }
    }
}

/// Messages sent from a client to the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Request the identity assigned to this connection.
    Identify,
    /// Enter the matchmaking queue.
    QueueJoin,
    /// Leave the matchmaking queue.
    QueueLeave,
    /// Relay a negotiation artifact to the session counterpart. The `to`
    /// field is audit-only: the relay routes by session membership.
    Signal { to: PeerId, payload: SignalPayload },
    /// The peer transport reported direct connectivity; the relay is no
    /// longer needed for this session.
    SessionReady,
    Ping,
}

/// Messages sent from the relay to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// The identity assigned to this connection.
    Identity { id: PeerId },
    /// Informational broadcast: number of clients currently connected.
    UsersOnline { size: usize },
    /// Two queued clients were paired. Both participants receive the same
    /// session id and complementary roles.
    PairFound {
        session_id: SessionId,
        counterpart: PeerId,
        role: Role,
    },
    /// A negotiation artifact relayed from the session counterpart.
    Signal { from: PeerId, payload: SignalPayload },
    /// The session counterpart disconnected mid-session.
    PeerGone,
    /// The request referenced a session this client is not part of.
    SessionNotFound,
    Error { message: String },
    Pong,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn client_messages_use_camel_case_tags() {
        let msg = serde_json::to_value(ClientMessage::QueueJoin).unwrap();
        assert_eq!(msg, json!({"type": "queueJoin"}));

        let msg = serde_json::to_value(ClientMessage::Signal {
            to: PeerId(Uuid::nil()),
            payload: SignalPayload::Offer { sdp: "v=0".into() },
        })
        .unwrap();
        assert_eq!(
            msg,
            json!({
                "type": "signal",
                "to": "00000000-0000-0000-0000-000000000000",
                "payload": {"signalType": "offer", "sdp": "v=0"},
            })
        );
    }

    #[test]
    fn pair_found_wire_shape() {
        let msg = serde_json::to_value(ServerMessage::PairFound {
            session_id: SessionId(Uuid::nil()),
            counterpart: PeerId(Uuid::nil()),
            role: Role::Guest,
        })
        .unwrap();
        assert_eq!(
            msg,
            json!({
                "type": "pairFound",
                "sessionId": "00000000-0000-0000-0000-000000000000",
                "counterpart": "00000000-0000-0000-0000-000000000000",
                "role": "guest",
            })
        );
    }

    #[test]
    fn ice_candidate_parses_from_wire() {
        let parsed: ServerMessage = serde_json::from_str(
            r#"{"type":"signal","from":"7f3e9a52-0000-4000-8000-000000000001",
                "payload":{"signalType":"iceCandidate","candidate":"candidate:1 1 UDP"}}"#,
        )
        .unwrap();
        match parsed {
            ServerMessage::Signal { payload, .. } => {
                assert_eq!(payload.kind(), "iceCandidate");
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn unknown_type_is_rejected() {
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"roomEnter"}"#).is_err());
    }
}

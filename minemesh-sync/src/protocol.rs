//! Envelope protocol carried over peer links.
//!
//! Wire format (JSON, camelCase, unknown fields ignored):
//! ```text
//! { "kind": "chat", "senderId": "ws://10.0.0.2:9000", "sequence": 17,
//!   "payload": { "text": "gl hf", "timestamp": 1718000000000 } }
//! ```
//!
//! Decoding is two-step: the outer envelope is parsed first so an unknown
//! `kind` can be told apart from a malformed payload, then the payload is
//! parsed into the type for that kind.

use std::collections::HashMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use minemesh_board::Board;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::chat::ChatEntry;
use crate::error::SyncError;
use crate::presence::UserProfile;
use crate::session::{SessionConfig, SessionState};

/// Opaque peer identifier assigned by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for PeerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Message kinds understood by this version of the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Sender's own user profile (handshake)
    Profile,
    /// Full session config replacement
    ConfigUpdate,
    /// New session with its initial board
    SessionStart,
    /// Full board replacement, last-write-wins on timestamp
    SessionUpdate,
    /// Session dropped back to configuring
    SessionEnd,
    /// Chat line
    Chat,
    /// Bootstrap: profiles the sender knows about
    Directory,
    /// Bootstrap: the sender's chat log
    ChatHistory,
    /// Bootstrap: the sender's active session
    SessionSync,
}

impl MessageKind {
    pub const ALL: [MessageKind; 9] = [
        MessageKind::Profile,
        MessageKind::ConfigUpdate,
        MessageKind::SessionStart,
        MessageKind::SessionUpdate,
        MessageKind::SessionEnd,
        MessageKind::Chat,
        MessageKind::Directory,
        MessageKind::ChatHistory,
        MessageKind::SessionSync,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Profile => "profile",
            Self::ConfigUpdate => "config-update",
            Self::SessionStart => "session-start",
            Self::SessionUpdate => "session-update",
            Self::SessionEnd => "session-end",
            Self::Chat => "chat",
            Self::Directory => "directory",
            Self::ChatHistory => "chat-history",
            Self::SessionSync => "session-sync",
        }
    }

    pub fn parse(kind: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.as_str() == kind)
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStart {
    pub config: SessionConfig,
    pub board: Board,
    /// Sender's clock at start; later updates are compared against it
    #[serde(default)]
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUpdate {
    pub board: Board,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEnd {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatText {
    pub text: String,
    pub timestamp: u64,
}

/// Kind-specific payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Profile(UserProfile),
    ConfigUpdate(SessionConfig),
    SessionStart(SessionStart),
    SessionUpdate(SessionUpdate),
    SessionEnd(SessionEnd),
    Chat(ChatText),
    Directory(Vec<UserProfile>),
    ChatHistory(Vec<ChatEntry>),
    SessionSync(SessionState),
}

impl Payload {
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Profile(_) => MessageKind::Profile,
            Self::ConfigUpdate(_) => MessageKind::ConfigUpdate,
            Self::SessionStart(_) => MessageKind::SessionStart,
            Self::SessionUpdate(_) => MessageKind::SessionUpdate,
            Self::SessionEnd(_) => MessageKind::SessionEnd,
            Self::Chat(_) => MessageKind::Chat,
            Self::Directory(_) => MessageKind::Directory,
            Self::ChatHistory(_) => MessageKind::ChatHistory,
            Self::SessionSync(_) => MessageKind::SessionSync,
        }
    }

    fn to_value(&self) -> serde_json::Result<Value> {
        match self {
            Self::Profile(p) => serde_json::to_value(p),
            Self::ConfigUpdate(c) => serde_json::to_value(c),
            Self::SessionStart(s) => serde_json::to_value(s),
            Self::SessionUpdate(u) => serde_json::to_value(u),
            Self::SessionEnd(e) => serde_json::to_value(e),
            Self::Chat(c) => serde_json::to_value(c),
            Self::Directory(d) => serde_json::to_value(d),
            Self::ChatHistory(h) => serde_json::to_value(h),
            Self::SessionSync(s) => serde_json::to_value(s),
        }
    }

    fn from_value(kind: MessageKind, value: Value) -> serde_json::Result<Self> {
        Ok(match kind {
            MessageKind::Profile => Self::Profile(serde_json::from_value(value)?),
            MessageKind::ConfigUpdate => Self::ConfigUpdate(serde_json::from_value(value)?),
            MessageKind::SessionStart => Self::SessionStart(serde_json::from_value(value)?),
            MessageKind::SessionUpdate => Self::SessionUpdate(serde_json::from_value(value)?),
            MessageKind::SessionEnd if value.is_null() => Self::SessionEnd(SessionEnd::default()),
            MessageKind::SessionEnd => Self::SessionEnd(serde_json::from_value(value)?),
            MessageKind::Chat => Self::Chat(serde_json::from_value(value)?),
            MessageKind::Directory => Self::Directory(serde_json::from_value(value)?),
            MessageKind::ChatHistory => Self::ChatHistory(serde_json::from_value(value)?),
            MessageKind::SessionSync => Self::SessionSync(serde_json::from_value(value)?),
        })
    }

    /// Reject payloads that parse but carry an unusable session config.
    fn check(&self) -> Result<(), SyncError> {
        let config = match self {
            Self::ConfigUpdate(c) => c,
            Self::SessionStart(s) => &s.config,
            Self::SessionSync(s) => &s.config,
            _ => return Ok(()),
        };
        config
            .validate()
            .map_err(|e| SyncError::MalformedEnvelope(e.to_string()))
    }
}

/// Outer wire shape; the payload stays untyped until the kind is known.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEnvelope {
    kind: String,
    sender_id: PeerId,
    sequence: u64,
    #[serde(default)]
    payload: Value,
}

/// Top-level protocol message.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub sender_id: PeerId,
    /// Per-sender counter, only used for duplicate suppression
    pub sequence: u64,
    pub payload: Payload,
}

impl Envelope {
    pub fn new(sender_id: PeerId, sequence: u64, payload: Payload) -> Self {
        Self {
            sender_id,
            sequence,
            payload,
        }
    }

    pub fn kind(&self) -> MessageKind {
        self.payload.kind()
    }

    /// Serialize to wire bytes.
    pub fn encode(&self) -> Result<Vec<u8>, SyncError> {
        let raw = RawEnvelope {
            kind: self.kind().as_str().to_string(),
            sender_id: self.sender_id.clone(),
            sequence: self.sequence,
            payload: self
                .payload
                .to_value()
                .map_err(|e| SyncError::MalformedEnvelope(e.to_string()))?,
        };
        serde_json::to_vec(&raw).map_err(|e| SyncError::MalformedEnvelope(e.to_string()))
    }

    /// Deserialize from wire bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, SyncError> {
        let raw: RawEnvelope = serde_json::from_slice(bytes)
            .map_err(|e| SyncError::MalformedEnvelope(e.to_string()))?;
        let kind = MessageKind::parse(&raw.kind)
            .ok_or_else(|| SyncError::UnknownMessageKind(raw.kind.clone()))?;
        let payload = Payload::from_value(kind, raw.payload)
            .map_err(|e| SyncError::MalformedEnvelope(format!("{kind} payload: {e}")))?;
        payload.check()?;
        Ok(Self {
            sender_id: raw.sender_id,
            sequence: raw.sequence,
            payload,
        })
    }
}

/// Per-sender high-water mark of applied sequence numbers.
///
/// Links are ordered and at most one is open per peer, so a sender's
/// sequences arrive increasing; anything at or below the mark is a replay.
#[derive(Debug, Default)]
pub struct SequenceTracker {
    highest: HashMap<PeerId, u64>,
}

impl SequenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `(sender, sequence)`. Returns `false` if it was already seen.
    pub fn observe(&mut self, sender: &PeerId, sequence: u64) -> bool {
        match self.highest.get_mut(sender) {
            Some(mark) if sequence <= *mark => false,
            Some(mark) => {
                *mark = sequence;
                true
            }
            None => {
                self.highest.insert(sender.clone(), sequence);
                true
            }
        }
    }

    pub fn last_seen(&self, sender: &PeerId) -> Option<u64> {
        self.highest.get(sender).copied()
    }

    /// Drop the mark for a sender whose link is gone. A later link starts
    /// a fresh ordered stream.
    pub fn forget(&mut self, sender: &PeerId) {
        self.highest.remove(sender);
    }
}

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presence::ProfileColor;

    fn alice() -> PeerId {
        PeerId::from("alice")
    }

    #[test]
    fn test_chat_envelope_wire_shape() {
        let env = Envelope::new(
            alice(),
            3,
            Payload::Chat(ChatText {
                text: "hello".into(),
                timestamp: 42,
            }),
        );
        let json: Value = serde_json::from_slice(&env.encode().unwrap()).unwrap();

        assert_eq!(json["kind"], "chat");
        assert_eq!(json["senderId"], "alice");
        assert_eq!(json["sequence"], 3);
        assert_eq!(json["payload"]["text"], "hello");
        assert_eq!(json["payload"]["timestamp"], 42);
    }

    #[test]
    fn test_profile_roundtrip() {
        let profile = UserProfile::new(alice(), "Alice", ProfileColor::from_peer_id(&alice()));
        let env = Envelope::new(alice(), 1, Payload::Profile(profile.clone()));
        let decoded = Envelope::decode(&env.encode().unwrap()).unwrap();

        assert_eq!(decoded.kind(), MessageKind::Profile);
        assert_eq!(decoded.payload, Payload::Profile(profile));
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let bytes = br#"{"kind":"chat","senderId":"bob","sequence":9,"hops":3,
            "payload":{"text":"hi","timestamp":5,"mood":"happy"}}"#;
        let env = Envelope::decode(bytes).unwrap();
        assert_eq!(env.sender_id, PeerId::from("bob"));
        assert_eq!(
            env.payload,
            Payload::Chat(ChatText {
                text: "hi".into(),
                timestamp: 5
            })
        );
    }

    #[test]
    fn test_unknown_kind_is_reported() {
        let bytes = br#"{"kind":"cursor","senderId":"bob","sequence":1,"payload":{}}"#;
        assert_eq!(
            Envelope::decode(bytes),
            Err(SyncError::UnknownMessageKind("cursor".into()))
        );
    }

    #[test]
    fn test_missing_fields_are_malformed() {
        let no_sequence = br#"{"kind":"chat","senderId":"bob","payload":{"text":"x","timestamp":1}}"#;
        let no_text = br#"{"kind":"chat","senderId":"bob","sequence":1,"payload":{"timestamp":1}}"#;
        let garbage = [0xFF, 0xFE, 0xFD];

        for bytes in [&no_sequence[..], &no_text[..], &garbage[..]] {
            let err = Envelope::decode(bytes).unwrap_err();
            assert!(matches!(err, SyncError::MalformedEnvelope(_)), "{err:?}");
        }
    }

    #[test]
    fn test_session_end_without_payload() {
        let bytes = br#"{"kind":"session-end","senderId":"bob","sequence":4}"#;
        let env = Envelope::decode(bytes).unwrap();
        assert_eq!(env.payload, Payload::SessionEnd(SessionEnd { reason: None }));
    }

    #[test]
    fn test_invalid_config_is_malformed() {
        let mut config = SessionConfig::default();
        config.width = 500;
        let env = Envelope::new(alice(), 1, Payload::ConfigUpdate(config));
        let err = Envelope::decode(&env.encode().unwrap()).unwrap_err();
        assert!(matches!(err, SyncError::MalformedEnvelope(_)));
    }

    #[test]
    fn test_kind_names_roundtrip() {
        for kind in MessageKind::ALL {
            assert_eq!(MessageKind::parse(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn test_sequence_tracker_drops_replays() {
        let mut seen = SequenceTracker::new();
        assert!(seen.observe(&alice(), 1));
        assert!(seen.observe(&alice(), 4));
        assert!(!seen.observe(&alice(), 4));
        assert!(!seen.observe(&alice(), 2));
        assert!(seen.observe(&PeerId::from("bob"), 1));
        assert_eq!(seen.last_seen(&alice()), Some(4));

        seen.forget(&alice());
        assert!(seen.observe(&alice(), 1));
    }
}

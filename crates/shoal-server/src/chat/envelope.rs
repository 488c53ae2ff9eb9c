//! Chat wire protocol — JSON over WebSocket and over the bus.
//!
//! One envelope type travels both hops. A client frame, a bus payload, and
//! a server push are all the same JSON object; only the routing fields
//! change hands. Exactly one payload field (`text`, `presence`, `friends`)
//! is populated per message kind.

use serde::{Deserialize, Serialize};

/// Message kind carried in the envelope's `type` field.
///
/// Converts through plain strings so kinds this process does not know about
/// still relay intact — the orchestrator routes them opaquely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MessageType {
    /// A user-typed chat line.
    Text,
    /// Online/offline transition for a user, fanned out to their friends.
    Presence,
    /// One-shot friend-list snapshot pushed on connect.
    Friends,
    /// Forward-compatible passthrough for kinds added later.
    Other(String),
}

impl From<String> for MessageType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "text" => MessageType::Text,
            "presence" => MessageType::Presence,
            "friends" => MessageType::Friends,
            _ => MessageType::Other(s),
        }
    }
}

impl From<MessageType> for String {
    fn from(kind: MessageType) -> Self {
        kind.as_str().to_owned()
    }
}

impl MessageType {
    pub fn as_str(&self) -> &str {
        match self {
            MessageType::Text => "text",
            MessageType::Presence => "presence",
            MessageType::Friends => "friends",
            MessageType::Other(s) => s,
        }
    }
}

/// One friend entry in a `friends` snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Friend {
    pub username: String,
    pub online: bool,
}

/// The chat message format, identical on the wire and on the bus.
///
/// `from`/`to` are always set on routed messages; inbound client frames may
/// omit them (the relay stamps `from` with the authenticated user).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: MessageType,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub friends: Option<Vec<Friend>>,
}

impl Envelope {
    pub fn text(from: &str, to: &str, text: impl Into<String>) -> Self {
        Envelope {
            kind: MessageType::Text,
            from: from.to_owned(),
            to: to.to_owned(),
            text: Some(text.into()),
            presence: None,
            friends: None,
        }
    }

    pub fn presence(from: &str, to: &str, online: bool) -> Self {
        Envelope {
            kind: MessageType::Presence,
            from: from.to_owned(),
            to: to.to_owned(),
            text: None,
            presence: Some(online),
            friends: None,
        }
    }

    /// A friends snapshot is addressed from the user to themselves.
    pub fn friends(user: &str, friends: Vec<Friend>) -> Self {
        Envelope {
            kind: MessageType::Friends,
            from: user.to_owned(),
            to: user.to_owned(),
            text: None,
            presence: None,
            friends: Some(friends),
        }
    }

    /// Serialize to a JSON string for a WebSocket text frame or bus payload.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from a JSON string (WebSocket text frame or bus payload).
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_round_trip() {
        let msg = Envelope::text("john", "alice", "hi");
        let json = msg.to_json().unwrap();
        assert!(json.contains(r#""type":"text""#));
        assert!(json.contains(r#""from":"john""#));
        assert!(json.contains(r#""to":"alice""#));
        assert!(json.contains(r#""text":"hi""#));
        // Unpopulated payload fields stay off the wire.
        assert!(!json.contains("presence"));
        assert!(!json.contains("friends"));

        let decoded = Envelope::from_json(&json).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn presence_round_trip() {
        let msg = Envelope::presence("alice", "john", true);
        let json = msg.to_json().unwrap();
        assert!(json.contains(r#""presence":true"#));

        let decoded = Envelope::from_json(&json).unwrap();
        assert_eq!(decoded.kind, MessageType::Presence);
        assert_eq!(decoded.presence, Some(true));
        assert!(decoded.text.is_none());
    }

    #[test]
    fn friends_round_trip() {
        let msg = Envelope::friends(
            "john",
            vec![
                Friend { username: "alice".into(), online: true },
                Friend { username: "bob".into(), online: false },
            ],
        );
        let json = msg.to_json().unwrap();
        assert!(json.contains(r#""type":"friends""#));
        assert!(json.contains(r#""username":"alice""#));

        let decoded = Envelope::from_json(&json).unwrap();
        let friends = decoded.friends.unwrap();
        assert_eq!(friends.len(), 2);
        assert!(friends[0].online);
        assert!(!friends[1].online);
        // Snapshot is self-addressed.
        assert_eq!(decoded.from, "john");
        assert_eq!(decoded.to, "john");
    }

    #[test]
    fn client_frame_without_routing_fields() {
        // What a browser actually sends: type + payload, no from/to.
        let msg = Envelope::from_json(r#"{"type":"text","text":"hello"}"#).unwrap();
        assert_eq!(msg.kind, MessageType::Text);
        assert_eq!(msg.from, "");
        assert_eq!(msg.to, "");
        assert_eq!(msg.text.as_deref(), Some("hello"));
    }

    #[test]
    fn unknown_kind_passes_through() {
        let msg = Envelope::from_json(r#"{"type":"typing","from":"john","to":"alice"}"#).unwrap();
        assert_eq!(msg.kind, MessageType::Other("typing".into()));

        let json = msg.to_json().unwrap();
        assert!(json.contains(r#""type":"typing""#));
    }

    #[test]
    fn missing_type_fails() {
        assert!(Envelope::from_json(r#"{"from":"john","to":"alice"}"#).is_err());
    }

    #[test]
    fn not_json_fails() {
        assert!(Envelope::from_json("PRIVMSG #chat :hi").is_err());
    }

    #[test]
    fn kind_as_str() {
        assert_eq!(MessageType::Text.as_str(), "text");
        assert_eq!(MessageType::Presence.as_str(), "presence");
        assert_eq!(MessageType::Friends.as_str(), "friends");
        assert_eq!(MessageType::Other("edit".into()).as_str(), "edit");
    }
}

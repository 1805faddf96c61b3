//! Canonical upstream message type.
//!
//! The fe-web wire uses inconsistent field names: `channel` aliases
//! `target`, and inbound messages carry the server tag in `server` rather
//! than `server_tag`. Normalization happens here, at the parse boundary;
//! the rest of the bridge only ever sees the canonical names.

use serde::{Deserialize, Serialize};

/// Upstream event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Message,
    StateDump,
    Nicklist,
    NicklistUpdate,
    NickChange,
    ChannelJoin,
    ChannelPart,
    ChannelKick,
    ChannelMode,
    UserQuit,
    UserMode,
    Topic,
    Away,
    Whois,
    QueryOpened,
    QueryClosed,
    ActivityUpdate,
    MarkRead,
    ServerStatus,
    SyncServer,
    AuthOk,
    Error,
    Pong,
    CommandResult,
    /// Any kind this bridge does not recognize; logged and dropped.
    #[serde(other)]
    Other,
}

impl Default for EventKind {
    fn default() -> Self {
        EventKind::Other
    }
}

/// A message to or from the fe-web WebSocket.
///
/// Zero/empty fields are omitted when serializing, matching what fe-web
/// itself sends.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebMessage {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,

    #[serde(rename = "type")]
    pub kind: EventKind,

    /// Server selector on outgoing requests (`sync_server` uses `"*"`).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub server: String,

    /// Canonical server tag. Inbound messages may carry this in `server`
    /// instead; see [`WebMessage::normalize`].
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub server_tag: String,

    /// Channel or nick the event concerns. `channel` is accepted as an
    /// inbound alias.
    #[serde(default, alias = "channel", skip_serializing_if = "String::is_empty")]
    pub target: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub nick: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub text: String,

    #[serde(default, skip_serializing_if = "is_zero_i32")]
    pub level: i32,

    /// Event time, seconds since epoch.
    #[serde(default, skip_serializing_if = "is_zero_i64")]
    pub timestamp: i64,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_own: bool,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_highlight: bool,

    /// Structured payload, e.g. the state-dump server list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_data: Option<serde_json::Map<String, serde_json::Value>>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub response_to: String,
}

fn is_zero_i32(value: &i32) -> bool {
    *value == 0
}

fn is_zero_i64(value: &i64) -> bool {
    *value == 0
}

impl WebMessage {
    /// Copy `server` into `server_tag` when the latter is absent.
    ///
    /// Applied to every inbound message before it leaves the upstream
    /// driver.
    pub fn normalize(mut self) -> Self {
        if self.server_tag.is_empty() && !self.server.is_empty() {
            self.server_tag = std::mem::take(&mut self.server);
        }
        self
    }

    /// State-dump request for all servers.
    pub fn state_request() -> Self {
        WebMessage {
            kind: EventKind::SyncServer,
            server: "*".into(),
            ..Default::default()
        }
    }

    /// Nick-list request for a channel.
    pub fn nicklist_request(server_tag: &str, target: &str) -> Self {
        WebMessage {
            kind: EventKind::Nicklist,
            server_tag: server_tag.into(),
            target: target.into(),
            ..Default::default()
        }
    }

    /// A text command routed to a buffer.
    pub fn command(server_tag: &str, target: &str, text: &str) -> Self {
        WebMessage {
            kind: EventKind::Message,
            server_tag: server_tag.into(),
            target: target.into(),
            text: text.into(),
            ..Default::default()
        }
    }
}

/// One entry of a nick-list payload (a JSON array in the `text` field).
#[derive(Debug, Clone, Deserialize)]
pub struct NickInfo {
    pub nick: String,
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    #[allow(dead_code)]
    pub mode: String,
    #[serde(default)]
    #[allow(dead_code)]
    pub host: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbound_aliases_are_normalized() {
        let msg: WebMessage = serde_json::from_str(
            r##"{"type":"message","channel":"#A","server":"libera","nick":"bob","text":"hi","timestamp":1700000000}"##,
        )
        .unwrap();
        let msg = msg.normalize();
        assert_eq!(msg.kind, EventKind::Message);
        assert_eq!(msg.target, "#A");
        assert_eq!(msg.server_tag, "libera");
        assert!(msg.server.is_empty());
        assert_eq!(msg.timestamp, 1700000000);
    }

    #[test]
    fn canonical_names_win_over_aliases() {
        let msg: WebMessage = serde_json::from_str::<WebMessage>(
            r##"{"type":"topic","server_tag":"libera","target":"#a","text":"new topic"}"##,
        )
        .unwrap()
        .normalize();
        assert_eq!(msg.server_tag, "libera");
        assert_eq!(msg.target, "#a");
    }

    #[test]
    fn unknown_kinds_parse_to_other() {
        let msg: WebMessage =
            serde_json::from_str(r#"{"type":"totally_new_event"}"#).unwrap();
        assert_eq!(msg.kind, EventKind::Other);
    }

    #[test]
    fn state_request_serializes_with_wildcard_server() {
        let json = serde_json::to_string(&WebMessage::state_request()).unwrap();
        assert_eq!(json, r#"{"type":"sync_server","server":"*"}"#);
    }

    #[test]
    fn nicklist_request_uses_canonical_names() {
        let json =
            serde_json::to_string(&WebMessage::nicklist_request("libera", "#a")).unwrap();
        assert_eq!(
            json,
            r##"{"type":"nicklist","server_tag":"libera","target":"#a"}"##
        );
    }
}

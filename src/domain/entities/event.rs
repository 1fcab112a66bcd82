use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Kind of chat message carried by an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    Group,
    Private,
    Other(String),
}

impl MessageKind {
    pub fn as_str(&self) -> &str {
        match self {
            MessageKind::Group => "group",
            MessageKind::Private => "private",
            MessageKind::Other(s) => s,
        }
    }
}

/// Sender details attached to message events
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Sender {
    pub user_id: i64,
    pub nickname: String,
    pub card: String,
    pub role: String,
}

/// An event pushed by the OneBot client.
///
/// Only the commonly used fields are typed; everything else is kept in
/// `extra` so plugins see the full event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Event {
    pub time: i64,
    pub self_id: i64,
    pub post_type: String,
    pub message_type: String,
    pub sub_type: String,
    pub message_id: i64,
    pub user_id: i64,
    pub group_id: i64,
    pub message: Value,
    pub raw_message: String,
    pub sender: Sender,
    pub meta_event_type: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Event {
    /// `None` for events that are not chat messages (heartbeats, notices...)
    pub fn message_kind(&self) -> Option<MessageKind> {
        match self.message_type.as_str() {
            "" => None,
            "group" => Some(MessageKind::Group),
            "private" => Some(MessageKind::Private),
            other => Some(MessageKind::Other(other.to_string())),
        }
    }

    /// Message text. Handles both the string and the segment-array formats;
    /// non-text segments are skipped.
    pub fn plain_text(&self) -> String {
        match &self.message {
            Value::String(s) => s.clone(),
            Value::Array(segments) => segments
                .iter()
                .filter(|seg| seg.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|seg| seg.pointer("/data/text").and_then(Value::as_str))
                .collect(),
            Value::Null => self.raw_message.clone(),
            other => other.to_string(),
        }
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.time, 0)
    }

    pub fn to_payload(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

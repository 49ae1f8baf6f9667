use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Who authored a message. Exactly two roles exist: the website visitor
/// and the site owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    Visitor,
    Daniel,
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Visitor => write!(f, "visitor"),
            Self::Daniel => write!(f, "daniel"),
        }
    }
}

/// Wire form of a message as stored under `conversations/<id>/messages/<key>`.
/// Field names are part of the store schema and must not change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub text: String,
    pub sender: Sender,
    /// Milliseconds since epoch, assigned by the sending client.
    pub timestamp: i64,
}

impl StoredMessage {
    pub fn new(text: impl Into<String>, sender: Sender) -> Self {
        Self {
            text: text.into(),
            sender,
            timestamp: now_millis(),
        }
    }
}

/// A message joined with its store key, ready for rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub id: String,
    pub text: String,
    pub sender: Sender,
    pub timestamp: i64,
}

impl ChatMessage {
    pub fn from_stored(id: impl Into<String>, message: StoredMessage) -> Self {
        Self {
            id: id.into(),
            text: message.text,
            sender: message.sender,
            timestamp: message.timestamp,
        }
    }
}

pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Flatten a message map into render order: timestamp ascending, with the
/// store key (insertion-ordered) breaking ties. Subscribers replace their
/// whole list with this on every snapshot, which absorbs out-of-order
/// delivery from the store.
pub fn sort_for_render(messages: &BTreeMap<String, StoredMessage>) -> Vec<ChatMessage> {
    let mut list: Vec<ChatMessage> = messages
        .iter()
        .map(|(key, message)| ChatMessage::from_stored(key.clone(), message.clone()))
        .collect();
    list.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
    list
}

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::message::{now_millis, StoredMessage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    #[default]
    Active,
    Closed,
}

/// Wire form of a conversation as stored under `conversations/<key>`.
///
/// `status` and `createdAt` default on read: the store creates intermediate
/// nodes implicitly, so a conversation written to only through its `messages`
/// path has neither field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationRecord {
    #[serde(default)]
    pub status: ConversationStatus,
    #[serde(default, rename = "createdAt")]
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub messages: BTreeMap<String, StoredMessage>,
}

impl ConversationRecord {
    pub fn new_active() -> Self {
        Self {
            status: ConversationStatus::Active,
            created_at: now_millis(),
            messages: BTreeMap::new(),
        }
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }
}

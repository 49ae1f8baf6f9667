//! Conversation Store client layer.
//!
//! The store itself is an external realtime database holding the
//! `conversations` tree. This module only defines the client contract and two
//! implementations: `RestStore` against the database's REST surface, and
//! `MemoryStore` for tests and offline demos. Per-key appends are atomic and
//! fan-out to readers is eventually consistent — both are properties of the
//! store, assumed here rather than implemented.

pub mod memory;
pub mod rest;

use async_trait::async_trait;
use std::collections::BTreeMap;

use crate::error::ParleyError;
use crate::models::{ConversationRecord, StoredMessage};

pub use memory::MemoryStore;
pub use rest::RestStore;

#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Push a new conversation record and return the store-assigned key.
    async fn create_conversation(
        &self,
        record: &ConversationRecord,
    ) -> Result<String, ParleyError>;

    /// Append a message to a conversation and return the store-assigned
    /// message key. The message key space is insertion-ordered.
    async fn append_message(
        &self,
        conversation_id: &str,
        message: &StoredMessage,
    ) -> Result<String, ParleyError>;

    /// Full snapshot of the conversation collection. This is the polling
    /// watcher's input; the store has no native "new child" event at the
    /// collection level, so change detection diffs these snapshots.
    async fn fetch_snapshot(&self) -> Result<BTreeMap<String, ConversationRecord>, ParleyError>;

    /// One conversation's message map, keyed by store message key.
    async fn fetch_messages(
        &self,
        conversation_id: &str,
    ) -> Result<BTreeMap<String, StoredMessage>, ParleyError>;
}

//! In-memory Conversation Store for tests and offline demos.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

use crate::error::ParleyError;
use crate::models::{ConversationRecord, StoredMessage};

use super::ConversationStore;

#[derive(Default)]
pub struct MemoryStore {
    conversations: RwLock<BTreeMap<String, ConversationRecord>>,
    counter: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero-padded monotonic keys, so lexicographic order equals insertion
    /// order — same contract as the hosted store's push keys.
    fn next_key(&self) -> String {
        format!("-{:016}", self.counter.fetch_add(1, Ordering::SeqCst))
    }

    pub async fn message_count(&self, conversation_id: &str) -> usize {
        self.conversations
            .read()
            .await
            .get(conversation_id)
            .map(|c| c.message_count())
            .unwrap_or(0)
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn create_conversation(
        &self,
        record: &ConversationRecord,
    ) -> Result<String, ParleyError> {
        let key = self.next_key();
        self.conversations
            .write()
            .await
            .insert(key.clone(), record.clone());
        Ok(key)
    }

    async fn append_message(
        &self,
        conversation_id: &str,
        message: &StoredMessage,
    ) -> Result<String, ParleyError> {
        let key = self.next_key();
        let mut conversations = self.conversations.write().await;
        // The hosted store creates intermediate nodes implicitly on write;
        // mirror that instead of rejecting unknown conversation ids.
        let record = conversations
            .entry(conversation_id.to_string())
            .or_insert_with(ConversationRecord::new_active);
        record.messages.insert(key.clone(), message.clone());
        Ok(key)
    }

    async fn fetch_snapshot(&self) -> Result<BTreeMap<String, ConversationRecord>, ParleyError> {
        Ok(self.conversations.read().await.clone())
    }

    async fn fetch_messages(
        &self,
        conversation_id: &str,
    ) -> Result<BTreeMap<String, StoredMessage>, ParleyError> {
        Ok(self
            .conversations
            .read()
            .await
            .get(conversation_id)
            .map(|c| c.messages.clone())
            .unwrap_or_default())
    }
}

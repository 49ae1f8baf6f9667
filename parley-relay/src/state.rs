//! Process-local relay bookkeeping.

use std::collections::HashMap;
use std::sync::Mutex;

/// Shared between the conversation watcher and the Discord listener. Both
/// callbacks may run concurrently; each access takes a short lock and no
/// lock is held across an await, so the maps cannot corrupt. What remains
/// open (deliberately, matching the system this replaces): a reply routed by
/// the last-active fallback can land on the wrong conversation when two
/// conversations get visitor messages in the same poll tick.
#[derive(Default)]
pub struct RelayState {
    counts: Mutex<HashMap<String, usize>>,
    last_active: Mutex<Option<String>>,
}

impl RelayState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Message count at the last processed snapshot; 0 for an unseen key.
    pub fn last_seen(&self, conversation_id: &str) -> usize {
        self.counts
            .lock()
            .expect("count map lock poisoned")
            .get(conversation_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn record_count(&self, conversation_id: &str, count: usize) {
        self.counts
            .lock()
            .expect("count map lock poisoned")
            .insert(conversation_id.to_string(), count);
    }

    /// Default reply target for owner messages that carry no thread tag.
    pub fn mark_active(&self, conversation_id: &str) {
        *self.last_active.lock().expect("last-active lock poisoned") =
            Some(conversation_id.to_string());
    }

    pub fn last_active(&self) -> Option<String> {
        self.last_active
            .lock()
            .expect("last-active lock poisoned")
            .clone()
    }
}

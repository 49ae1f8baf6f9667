//! Headless Widget Client for the portfolio chat relay.
//!
//! Gives a visitor a persistent two-way conversation without login. The
//! widget owns all of its state explicitly (no ambient globals), talks to the
//! Conversation Store through the `ConversationStore` trait, and surfaces
//! everything a frontend needs — message list updates and notification cues —
//! as `WidgetEvent`s on a channel.
//!
//! Store failures on the visitor path are absorbed: logged, never retried,
//! never raised to the caller. Without a store the widget runs in demo mode
//! and answers sends with a canned acknowledgment.

pub mod persistence;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use parley_core::config::WidgetConfig;
use parley_core::models::{
    now_millis, sort_for_render, ChatMessage, ConversationRecord, Sender, StoredMessage,
};
use parley_core::store::ConversationStore;

pub use persistence::{ConversationKeyStore, FileKeyStore, MemoryKeyStore};

/// Two-phase conversation identity. A provisional client-generated key keeps
/// the UI responsive while the store write is in flight; once the store
/// assigns its own key, the handle flips to `Confirmed` and that key is the
/// one persisted and used for every later operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationHandle {
    Pending(String),
    Confirmed(String),
}

impl ConversationHandle {
    pub fn id(&self) -> &str {
        match self {
            Self::Pending(id) | Self::Confirmed(id) => id,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self, Self::Confirmed(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WidgetEvent {
    /// Full replacement list in render order. Not an incremental patch.
    MessagesUpdated(Vec<ChatMessage>),
    /// The owner replied while the widget was closed.
    NotificationCue,
}

#[derive(Default)]
struct WidgetState {
    handle: Option<ConversationHandle>,
    messages: Vec<ChatMessage>,
    /// Message count at the last applied store snapshot. Optimistic local
    /// appends do not advance this.
    last_snapshot_count: usize,
    in_flight: bool,
    open: bool,
    unread: bool,
}

pub struct ChatWidget {
    store: Option<Arc<dyn ConversationStore>>,
    keys: Arc<dyn ConversationKeyStore>,
    config: WidgetConfig,
    state: Arc<Mutex<WidgetState>>,
    events: mpsc::UnboundedSender<WidgetEvent>,
}

impl ChatWidget {
    /// `store: None` puts the widget in demo mode: sends render locally and
    /// get a scripted acknowledgment, nothing touches a store.
    pub fn new(
        store: Option<Arc<dyn ConversationStore>>,
        keys: Arc<dyn ConversationKeyStore>,
        config: WidgetConfig,
    ) -> (Self, mpsc::UnboundedReceiver<WidgetEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let widget = Self {
            store,
            keys,
            config,
            state: Arc::new(Mutex::new(WidgetState::default())),
            events,
        };
        (widget, rx)
    }

    /// Resume the persisted conversation, or create a new one.
    ///
    /// Resume never re-creates the record and never re-sends the welcome
    /// message. Creation is two-phase: the welcome renders immediately under
    /// a provisional key, then the store record is created and the
    /// store-assigned key replaces the provisional one. A store failure
    /// leaves the handle `Pending` — logged, not surfaced.
    pub async fn initialize(&self) {
        {
            let state = self.lock_state();
            if state.handle.is_some() {
                return;
            }
        }

        if let Some(saved) = self.keys.load() {
            self.lock_state().handle = Some(ConversationHandle::Confirmed(saved));
            return;
        }

        let provisional = format!("chat-{}", now_millis());
        let welcome = StoredMessage::new(self.config.welcome_text.clone(), Sender::Daniel);
        {
            let mut state = self.lock_state();
            state.messages = vec![ChatMessage::from_stored("welcome", welcome.clone())];
            state.last_snapshot_count = 1;
            state.handle = Some(ConversationHandle::Pending(provisional.clone()));
        }
        if let Err(e) = self.keys.save(&provisional) {
            tracing::warn!("Failed to persist provisional conversation key: {}", e);
        }
        self.emit_messages();

        let Some(store) = &self.store else {
            return;
        };

        match store.create_conversation(&ConversationRecord::new_active()).await {
            Ok(key) => {
                if let Err(e) = store.append_message(&key, &welcome).await {
                    tracing::warn!("Failed to write welcome message: {}", e);
                }
                if let Err(e) = self.keys.save(&key) {
                    tracing::warn!("Failed to persist conversation key: {}", e);
                }
                self.lock_state().handle = Some(ConversationHandle::Confirmed(key));
            }
            Err(e) => {
                // Stays Pending; the visitor keeps a responsive local chat.
                tracing::warn!("Failed to create conversation record: {}", e);
            }
        }
    }

    /// Send a visitor message. Returns whether the message was accepted —
    /// empty/whitespace input and sends while one is in flight are rejected.
    /// Never fails: store errors are logged and swallowed (at-most-once, no
    /// retry), demo mode answers with the canned acknowledgment.
    pub async fn send_message(&self, text: &str) -> bool {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return false;
        }

        let conversation_id = {
            let mut state = self.lock_state();
            let Some(handle) = &state.handle else {
                return false;
            };
            if state.in_flight {
                return false;
            }
            let id = handle.id().to_string();
            state.in_flight = true;

            // Optimistic local append for zero-latency feedback. The store's
            // own copy replaces this on the next snapshot, so a short-lived
            // duplicate-looking entry is expected.
            state.messages.push(ChatMessage {
                id: format!("local-{}", now_millis()),
                text: trimmed.to_string(),
                sender: Sender::Visitor,
                timestamp: now_millis(),
            });
            id
        };
        self.emit_messages();

        match &self.store {
            Some(store) => {
                let message = StoredMessage::new(trimmed, Sender::Visitor);
                if let Err(e) = store.append_message(&conversation_id, &message).await {
                    tracing::warn!("Failed to send message: {}", e);
                }
            }
            None => {
                tokio::time::sleep(Duration::from_millis(self.config.demo_ack_delay_ms)).await;
                let ack = ChatMessage {
                    id: format!("local-{}", now_millis()),
                    text: self.config.demo_ack_text.clone(),
                    sender: Sender::Daniel,
                    timestamp: now_millis(),
                };
                self.lock_state().messages.push(ack);
                self.emit_messages();
            }
        }

        self.lock_state().in_flight = false;
        true
    }

    /// Spawn the live subscription: a poll task that applies message-map
    /// snapshots for the lifetime of the widget. No-op handle in demo mode.
    pub fn subscribe(&self) -> Option<JoinHandle<()>> {
        let store = self.store.clone()?;
        let state = self.state.clone();
        let events = self.events.clone();
        let interval = Duration::from_secs(self.config.poll_interval_seconds.max(1));

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let Some(id) = current_id(&state) else {
                    continue;
                };
                match store.fetch_messages(&id).await {
                    Ok(messages) if !messages.is_empty() => {
                        let sorted = sort_for_render(&messages);
                        apply_snapshot(&state, &events, sorted);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::debug!("Subscription poll failed: {}", e);
                    }
                }
            }
        }))
    }

    /// One subscription delivery: fetch the current message map and apply it.
    /// The spawned subscription does exactly this on every tick.
    pub async fn refresh(&self) {
        let Some(store) = &self.store else {
            return;
        };
        let Some(id) = current_id(&self.state) else {
            return;
        };
        match store.fetch_messages(&id).await {
            Ok(messages) if !messages.is_empty() => {
                let sorted = sort_for_render(&messages);
                apply_snapshot(&self.state, &self.events, sorted);
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!("Subscription poll failed: {}", e);
            }
        }
    }

    pub fn set_open(&self, open: bool) {
        let mut state = self.lock_state();
        state.open = open;
        if open {
            state.unread = false;
        }
    }

    pub fn has_unread(&self) -> bool {
        self.lock_state().unread
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.lock_state().messages.clone()
    }

    pub fn conversation_handle(&self) -> Option<ConversationHandle> {
        self.lock_state().handle.clone()
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, WidgetState> {
        self.state.lock().expect("widget state lock poisoned")
    }

    fn emit_messages(&self) {
        let messages = self.lock_state().messages.clone();
        let _ = self.events.send(WidgetEvent::MessagesUpdated(messages));
    }
}

fn current_id(state: &Mutex<WidgetState>) -> Option<String> {
    state
        .lock()
        .expect("widget state lock poisoned")
        .handle
        .as_ref()
        .map(|h| h.id().to_string())
}

/// Replace the rendered list with a sorted store snapshot. Fires the
/// notification cue when the newest message is from the owner, the count
/// grew past the previous snapshot, and the widget is closed.
fn apply_snapshot(
    state: &Mutex<WidgetState>,
    events: &mpsc::UnboundedSender<WidgetEvent>,
    sorted: Vec<ChatMessage>,
) {
    let cue = {
        let mut state = state.lock().expect("widget state lock poisoned");
        let grew = sorted.len() > state.last_snapshot_count;
        let from_owner = sorted
            .last()
            .map(|m| m.sender == Sender::Daniel)
            .unwrap_or(false);
        let cue = grew && from_owner && !state.open;
        if cue {
            state.unread = true;
        }
        state.last_snapshot_count = sorted.len();
        state.messages = sorted.clone();
        cue
    };

    let _ = events.send(WidgetEvent::MessagesUpdated(sorted));
    if cue {
        let _ = events.send(WidgetEvent::NotificationCue);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::store::MemoryStore;

    fn test_config() -> WidgetConfig {
        WidgetConfig {
            demo_ack_delay_ms: 10,
            ..WidgetConfig::default()
        }
    }

    fn widget_with_store(
        store: Arc<MemoryStore>,
        keys: Arc<dyn ConversationKeyStore>,
    ) -> (ChatWidget, mpsc::UnboundedReceiver<WidgetEvent>) {
        ChatWidget::new(Some(store), keys, test_config())
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<WidgetEvent>) -> Vec<WidgetEvent> {
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            out.push(ev);
        }
        out
    }

    // ========================================================================
    // Initialization
    // ========================================================================

    #[tokio::test]
    async fn initialize_creates_record_and_confirms_key() {
        let store = Arc::new(MemoryStore::new());
        let keys = Arc::new(MemoryKeyStore::new());
        let (widget, _rx) = widget_with_store(store.clone(), keys.clone());

        widget.initialize().await;

        let handle = widget.conversation_handle().unwrap();
        assert!(handle.is_confirmed());
        assert_eq!(keys.load().as_deref(), Some(handle.id()));

        // Record exists with exactly the welcome message, authored by daniel.
        let snapshot = store.fetch_snapshot().await.unwrap();
        assert_eq!(snapshot.len(), 1);
        let record = &snapshot[handle.id()];
        assert_eq!(record.message_count(), 1);
        let welcome = record.messages.values().next().unwrap();
        assert_eq!(welcome.sender, Sender::Daniel);
    }

    #[tokio::test]
    async fn reinitialize_with_saved_key_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let keys = Arc::new(MemoryKeyStore::new());
        {
            let (widget, _rx) = widget_with_store(store.clone(), keys.clone());
            widget.initialize().await;
        }
        let saved = keys.load().unwrap();

        // Second session, same key store: no new record, no second welcome.
        let (widget, _rx) = widget_with_store(store.clone(), keys.clone());
        widget.initialize().await;

        let handle = widget.conversation_handle().unwrap();
        assert_eq!(handle.id(), saved);
        let snapshot = store.fetch_snapshot().await.unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[&saved].message_count(), 1);
    }

    #[tokio::test]
    async fn initialize_without_store_stays_pending_with_local_welcome() {
        let keys = Arc::new(MemoryKeyStore::new());
        let (widget, mut rx) = ChatWidget::new(None, keys, test_config());

        widget.initialize().await;

        let handle = widget.conversation_handle().unwrap();
        assert!(!handle.is_confirmed());
        assert!(handle.id().starts_with("chat-"));
        let messages = widget.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].sender, Sender::Daniel);
        assert!(matches!(
            drain(&mut rx).first(),
            Some(WidgetEvent::MessagesUpdated(_))
        ));
    }

    // ========================================================================
    // Sending
    // ========================================================================

    #[tokio::test]
    async fn send_rejects_empty_and_whitespace() {
        let store = Arc::new(MemoryStore::new());
        let keys = Arc::new(MemoryKeyStore::new());
        let (widget, _rx) = widget_with_store(store.clone(), keys);
        widget.initialize().await;

        assert!(!widget.send_message("").await);
        assert!(!widget.send_message("   \n").await);

        let handle = widget.conversation_handle().unwrap();
        assert_eq!(store.message_count(handle.id()).await, 1); // welcome only
    }

    #[tokio::test]
    async fn send_appends_optimistically_and_writes_to_store() {
        let store = Arc::new(MemoryStore::new());
        let keys = Arc::new(MemoryKeyStore::new());
        let (widget, _rx) = widget_with_store(store.clone(), keys);
        widget.initialize().await;

        assert!(widget.send_message("  Hello  ").await);

        // Trimmed text, rendered locally before any snapshot confirms it.
        let messages = widget.messages();
        assert_eq!(messages.last().unwrap().text, "Hello");
        assert_eq!(messages.last().unwrap().sender, Sender::Visitor);

        let handle = widget.conversation_handle().unwrap();
        assert_eq!(store.message_count(handle.id()).await, 2);
    }

    #[tokio::test]
    async fn send_before_initialize_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        let keys = Arc::new(MemoryKeyStore::new());
        let (widget, _rx) = widget_with_store(store, keys);

        assert!(!widget.send_message("hello").await);
    }

    #[tokio::test]
    async fn unreachable_store_never_surfaces_an_error() {
        use parley_core::error::ParleyError;
        use parley_core::models::ConversationRecord;
        use std::collections::BTreeMap;

        struct UnreachableStore;

        #[async_trait::async_trait]
        impl ConversationStore for UnreachableStore {
            async fn create_conversation(
                &self,
                _record: &ConversationRecord,
            ) -> Result<String, ParleyError> {
                Err(ParleyError::Store("connection refused".into()))
            }

            async fn append_message(
                &self,
                _conversation_id: &str,
                _message: &StoredMessage,
            ) -> Result<String, ParleyError> {
                Err(ParleyError::Store("connection refused".into()))
            }

            async fn fetch_snapshot(
                &self,
            ) -> Result<BTreeMap<String, ConversationRecord>, ParleyError> {
                Err(ParleyError::Store("connection refused".into()))
            }

            async fn fetch_messages(
                &self,
                _conversation_id: &str,
            ) -> Result<BTreeMap<String, StoredMessage>, ParleyError> {
                Err(ParleyError::Store("connection refused".into()))
            }
        }

        let keys = Arc::new(MemoryKeyStore::new());
        let (widget, _rx) =
            ChatWidget::new(Some(Arc::new(UnreachableStore)), keys, test_config());

        // Every store call fails; nothing reaches the caller.
        widget.initialize().await;
        let handle = widget.conversation_handle().unwrap();
        assert!(!handle.is_confirmed(), "failed create leaves the handle pending");

        assert!(widget.send_message("test").await);
        widget.refresh().await;

        // The message still rendered locally.
        let messages = widget.messages();
        assert_eq!(messages.last().unwrap().text, "test");
    }

    #[tokio::test]
    async fn demo_mode_send_appends_canned_ack_without_error() {
        let keys = Arc::new(MemoryKeyStore::new());
        let (widget, _rx) = ChatWidget::new(None, keys, test_config());
        widget.initialize().await;

        assert!(widget.send_message("test").await);

        let messages = widget.messages();
        // welcome + visitor message + canned acknowledgment
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1].text, "test");
        assert_eq!(messages[1].sender, Sender::Visitor);
        assert_eq!(messages[2].sender, Sender::Daniel);
        assert_eq!(messages[2].text, test_config().demo_ack_text);
    }

    // ========================================================================
    // Subscription snapshots
    // ========================================================================

    #[tokio::test]
    async fn refresh_renders_store_order_not_arrival_order() {
        let store = Arc::new(MemoryStore::new());
        let keys = Arc::new(MemoryKeyStore::new());
        let (widget, _rx) = widget_with_store(store.clone(), keys);
        widget.initialize().await;
        let id = widget.conversation_handle().unwrap().id().to_string();

        // Arrival order scrambled relative to timestamps.
        store
            .append_message(&id, &StoredMessage { text: "late".into(), sender: Sender::Visitor, timestamp: now_millis() + 5000 })
            .await
            .unwrap();
        store
            .append_message(&id, &StoredMessage { text: "early".into(), sender: Sender::Visitor, timestamp: now_millis() - 5000 })
            .await
            .unwrap();

        widget.refresh().await;

        let texts: Vec<String> = widget.messages().iter().map(|m| m.text.clone()).collect();
        let late_pos = texts.iter().position(|t| t == "late").unwrap();
        let early_pos = texts.iter().position(|t| t == "early").unwrap();
        assert!(early_pos < late_pos, "rendered order must follow timestamps");
    }

    #[tokio::test]
    async fn owner_reply_fires_cue_when_widget_closed() {
        let store = Arc::new(MemoryStore::new());
        let keys = Arc::new(MemoryKeyStore::new());
        let (widget, mut rx) = widget_with_store(store.clone(), keys);
        widget.initialize().await;
        let id = widget.conversation_handle().unwrap().id().to_string();
        drain(&mut rx);

        store
            .append_message(&id, &StoredMessage::new("Got it!", Sender::Daniel))
            .await
            .unwrap();
        widget.refresh().await;

        let events = drain(&mut rx);
        assert!(events.contains(&WidgetEvent::NotificationCue));
        assert!(widget.has_unread());
    }

    #[tokio::test]
    async fn owner_reply_with_widget_open_skips_cue() {
        let store = Arc::new(MemoryStore::new());
        let keys = Arc::new(MemoryKeyStore::new());
        let (widget, mut rx) = widget_with_store(store.clone(), keys);
        widget.initialize().await;
        widget.set_open(true);
        let id = widget.conversation_handle().unwrap().id().to_string();
        drain(&mut rx);

        store
            .append_message(&id, &StoredMessage::new("Got it!", Sender::Daniel))
            .await
            .unwrap();
        widget.refresh().await;

        let events = drain(&mut rx);
        assert!(!events.contains(&WidgetEvent::NotificationCue));
        assert!(!widget.has_unread());
        // The list still updated.
        assert!(matches!(events.last(), Some(WidgetEvent::MessagesUpdated(_))));
    }

    #[tokio::test]
    async fn visitor_echo_in_snapshot_does_not_cue() {
        let store = Arc::new(MemoryStore::new());
        let keys = Arc::new(MemoryKeyStore::new());
        let (widget, mut rx) = widget_with_store(store.clone(), keys);
        widget.initialize().await;
        widget.send_message("hello").await;
        drain(&mut rx);

        // The snapshot confirming the visitor's own message must not cue.
        widget.refresh().await;
        let events = drain(&mut rx);
        assert!(!events.contains(&WidgetEvent::NotificationCue));
    }

    #[tokio::test]
    async fn opening_widget_clears_unread() {
        let store = Arc::new(MemoryStore::new());
        let keys = Arc::new(MemoryKeyStore::new());
        let (widget, _rx) = widget_with_store(store.clone(), keys);
        widget.initialize().await;
        let id = widget.conversation_handle().unwrap().id().to_string();

        store
            .append_message(&id, &StoredMessage::new("ping", Sender::Daniel))
            .await
            .unwrap();
        widget.refresh().await;
        assert!(widget.has_unread());

        widget.set_open(true);
        assert!(!widget.has_unread());
    }
}

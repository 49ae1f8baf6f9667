//! Discord gateway listener — the owner's reply path.
//!
//! Every human message in the watched channel is treated as a reply to a
//! visitor. Target resolution: a reply-in-thread to a forwarded message wins
//! (its embedded tag names the conversation), otherwise the last-active
//! conversation. The owner always gets a reaction back: ❓ no target,
//! ✅ stored, ❌ store write failed.

use std::sync::Arc;

use serenity::all::{ChannelId, Context, EventHandler, Message, Ready};
use serenity::async_trait;

use parley_core::models::{Sender, StoredMessage};
use parley_core::store::ConversationStore;

use crate::forward;
use crate::state::RelayState;

pub struct Handler {
    pub store: Arc<dyn ConversationStore>,
    pub state: Arc<RelayState>,
    pub channel_id: u64,
}

/// Thread-reply tag beats the last-active fallback.
fn choose_target(referenced_content: Option<&str>, fallback: Option<String>) -> Option<String> {
    referenced_content
        .and_then(forward::parse_conversation_tag)
        .or(fallback)
}

impl Handler {
    /// Fetch failures on the referenced message degrade silently to the
    /// fallback target.
    async fn resolve_target(&self, ctx: &Context, msg: &Message) -> Option<String> {
        let referenced_content = match (&msg.referenced_message, &msg.message_reference) {
            (Some(referenced), _) => Some(referenced.content.clone()),
            (None, Some(reference)) => match reference.message_id {
                Some(message_id) => msg
                    .channel_id
                    .message(&ctx.http, message_id)
                    .await
                    .ok()
                    .map(|m| m.content),
                None => None,
            },
            (None, None) => None,
        };

        choose_target(referenced_content.as_deref(), self.state.last_active())
    }
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        tracing::info!("Portfolio chat bot online as {}", ready.user.name);

        if self.channel_id == 0 {
            tracing::warn!("No reply channel configured; continuing in notify-only mode");
            return;
        }

        // Cache-warm the reply channel. Failure is not fatal: the relay keeps
        // running in notify-only mode and replies stay unavailable.
        match ctx.http.get_channel(ChannelId::new(self.channel_id)).await {
            Ok(_) => tracing::info!("Watching channel {}", self.channel_id),
            Err(e) => tracing::warn!(
                "Could not fetch channel {} ({}); continuing in notify-only mode",
                self.channel_id,
                e
            ),
        }
    }

    async fn message(&self, ctx: Context, msg: Message) {
        // Only the owner's channel, only humans. Webhook messages are our
        // own announcements coming back.
        if msg.channel_id.get() != self.channel_id {
            return;
        }
        if msg.author.bot || msg.webhook_id.is_some() {
            return;
        }

        let reply_text = msg.content.trim().to_string();
        if reply_text.is_empty() {
            return;
        }

        let Some(conversation_id) = self.resolve_target(&ctx, &msg).await else {
            tracing::warn!("No active conversation found. Wait for a visitor message first.");
            let _ = msg.react(&ctx.http, '❓').await;
            return;
        };

        let reply = StoredMessage::new(reply_text.clone(), Sender::Daniel);
        match self.store.append_message(&conversation_id, &reply).await {
            Ok(_) => {
                tracing::info!("Reply sent to {}: \"{}\"", conversation_id, reply_text);
                let _ = msg.react(&ctx.http, '✅').await;
            }
            Err(e) => {
                tracing::error!("Failed to send reply: {}", e);
                let _ = msg.react(&ctx.http, '❌').await;
            }
        }
    }
}

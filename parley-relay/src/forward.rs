//! Outbound Discord messages and the reply-routing tag.
//!
//! The formatter and the tag parser are a de facto protocol: a forwarded
//! message ends with ``🔗 ID: `<conversation key>` `` and
//! `parse_conversation_tag` recovers that key from a reply-quoted copy.
//! They live side by side so they change in lockstep.

use async_trait::async_trait;
use chrono::Local;
use serde::Serialize;
use serenity::all::ChannelId;
use serenity::http::Http;
use std::sync::Arc;

use parley_core::config::DiscordConfig;

const TAG_LABEL: &str = "ID: `";

/// Human timestamp used in channel announcements.
fn local_timestamp() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Channel text for a forwarded visitor message.
pub fn format_visitor_message(conversation_id: &str, text: &str) -> String {
    format!(
        "💬 **New Message**\n🕐 {}\n\n> {}\n\n🔗 ID: `{}`",
        local_timestamp(),
        text,
        conversation_id
    )
}

/// Channel text announcing a newly created conversation.
pub fn format_new_conversation(conversation_id: &str) -> String {
    format!(
        "🆕 **New Chat Started!**\n🕐 {}\n🔗 ID: `{}`",
        local_timestamp(),
        conversation_id
    )
}

/// Recover the conversation key embedded in a forwarded message.
pub fn parse_conversation_tag(content: &str) -> Option<String> {
    let start = content.find(TAG_LABEL)? + TAG_LABEL.len();
    let rest = &content[start..];
    let end = rest.find('`')?;
    if end == 0 {
        return None;
    }
    Some(rest[..end].to_string())
}

/// Body shape the Discord webhook expects.
#[derive(Debug, Serialize)]
pub struct WebhookPayload {
    pub content: String,
    pub username: String,
    pub avatar_url: String,
}

/// Seam between the watcher and the messaging channel. Tests record
/// announcements; production posts to Discord.
#[async_trait]
pub trait Outbound: Send + Sync {
    async fn announce(&self, content: &str) -> anyhow::Result<()>;
}

/// Webhook-first announcer with a plain channel message as fallback.
pub struct DiscordOutbound {
    client: reqwest::Client,
    webhook_url: Option<String>,
    webhook_username: String,
    avatar_url: String,
    channel_id: u64,
    gateway_http: Option<Arc<Http>>,
}

impl DiscordOutbound {
    pub fn new(config: &DiscordConfig, gateway_http: Option<Arc<Http>>) -> Self {
        Self {
            client: reqwest::Client::new(),
            webhook_url: config.webhook_url.clone().filter(|u| !u.is_empty()),
            webhook_username: config.webhook_username.clone(),
            avatar_url: config.avatar_url.clone(),
            channel_id: config.channel_id,
            gateway_http,
        }
    }

    async fn post_webhook(&self, url: &str, content: &str) -> anyhow::Result<()> {
        self.client
            .post(url)
            .json(&WebhookPayload {
                content: content.to_string(),
                username: self.webhook_username.clone(),
                avatar_url: self.avatar_url.clone(),
            })
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[async_trait]
impl Outbound for DiscordOutbound {
    async fn announce(&self, content: &str) -> anyhow::Result<()> {
        if let Some(url) = &self.webhook_url {
            match self.post_webhook(url, content).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::warn!("Webhook failed, trying channel message: {}", e);
                }
            }
        }

        match (&self.gateway_http, self.channel_id) {
            (Some(http), id) if id != 0 => {
                ChannelId::new(id).say(http.as_ref(), content).await?;
                Ok(())
            }
            _ => anyhow::bail!("no webhook or channel available for announcement"),
        }
    }
}

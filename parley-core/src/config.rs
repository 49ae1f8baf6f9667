use config::{Config, ConfigError, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct ParleyConfig {
    pub service: ServiceConfig,
    pub store: StoreConfig,
    pub discord: DiscordConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub widget: WidgetConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// Base URL of the realtime database REST endpoint, without trailing slash.
    pub base_url: String,
    /// Optional database auth token, appended as `?auth=` to every request.
    #[serde(default)]
    pub auth_token: Option<String>,
    /// How often the relay re-reads the conversation collection.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,
}

fn default_poll_interval() -> u64 {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct DiscordConfig {
    /// Channel the owner replies in. Everything else is ignored.
    pub channel_id: u64,
    /// Gateway token. Usually left empty here and supplied via
    /// the DISCORD_BOT_TOKEN env var instead.
    #[serde(default)]
    pub bot_token: Option<String>,
    /// Webhook used for outbound announcements; channel messages are the fallback.
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default = "default_webhook_username")]
    pub webhook_username: String,
    #[serde(default = "default_avatar_url")]
    pub avatar_url: String,
}

fn default_webhook_username() -> String {
    "Portfolio Chat".to_string()
}

fn default_avatar_url() -> String {
    "https://i.imgur.com/AfFp7pu.png".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    /// Shared secret for POST /chat/reply. When set, requests must carry
    /// `Authorization: Bearer <secret>`.
    #[serde(default)]
    pub reply_secret: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: 8787,
            reply_secret: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct WidgetConfig {
    /// Where the widget persists its conversation key between sessions.
    pub key_path: String,
    pub welcome_text: String,
    pub demo_ack_text: String,
    pub demo_ack_delay_ms: u64,
    pub poll_interval_seconds: u64,
}

impl Default for WidgetConfig {
    fn default() -> Self {
        Self {
            key_path: ".parley-conversation".to_string(),
            welcome_text: "Hi there! 👋 Feel free to ask me anything about my work or projects. I'll get back to you as soon as I can!".to_string(),
            demo_ack_text: "Thanks for your message! I've been notified and will respond soon. 💬".to_string(),
            demo_ack_delay_ms: 1500,
            poll_interval_seconds: 2,
        }
    }
}

impl ParleyConfig {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder().add_source(File::with_name(path)).build()?;
        s.try_deserialize()
    }
}

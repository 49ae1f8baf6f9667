//! parley-cli — terminal chat client for the portfolio message relay
//!
//! Drives the same widget protocol the website embeds: resumes (or creates)
//! a conversation, subscribes to it, and sends visitor messages typed on
//! stdin. Owner replies arrive live through the subscription.
//!
//! # Subcommands
//! - `chat [--demo]` — interactive conversation with the site owner
//! - `status`        — show relay server health

use std::sync::Arc;

use chrono::{Local, TimeZone};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};

use parley_core::store::{ConversationStore, RestStore};
use parley_core::ParleyConfig;
use parley_widget::{ChatWidget, FileKeyStore, WidgetEvent};

const DEFAULT_SERVER: &str = "http://127.0.0.1:8787";

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(
    name = "parley-cli",
    version,
    about = "Terminal chat client for the portfolio message relay"
)]
struct Cli {
    /// Relay HTTP server URL (overrides PARLEY_RELAY_URL env var)
    #[arg(long, env = "PARLEY_RELAY_URL", default_value = DEFAULT_SERVER)]
    server: String,

    /// Path to the parley config file
    #[arg(short, long, default_value = "parley.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Chat with the site owner from the terminal
    Chat {
        /// Run without a store connection (scripted acknowledgments only)
        #[arg(long)]
        demo: bool,
    },

    /// Show relay server status
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Commands::Chat { demo } => run_chat(&cli.config, demo).await,
        Commands::Status => run_status(&cli.server).await,
    }
}

// ============================================================================
// chat
// ============================================================================

async fn run_chat(config_path: &str, demo: bool) -> anyhow::Result<()> {
    let config = ParleyConfig::load(config_path)?;

    let store: Option<Arc<dyn ConversationStore>> = if demo {
        println!("(demo mode — messages are not delivered anywhere)");
        None
    } else {
        Some(Arc::new(RestStore::new(&config.store)))
    };

    let keys = Arc::new(FileKeyStore::new(&config.widget.key_path));
    let (widget, mut events) = ChatWidget::new(store, keys, config.widget.clone());
    // The terminal is the open widget; cues are unnecessary here.
    widget.set_open(true);

    widget.initialize().await;
    let _subscription = widget.subscribe();

    println!("Connected. Type a message and press Enter (/quit to exit).");
    for message in widget.messages() {
        print_message(&message);
    }

    // Print newly arrived messages as snapshots come in.
    let mut printed = widget.messages().len();
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if let WidgetEvent::MessagesUpdated(messages) = event {
                for message in messages.iter().skip(printed) {
                    print_message(message);
                }
                printed = printed.max(messages.len());
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if line.trim() == "/quit" {
            break;
        }
        widget.send_message(&line).await;
    }

    printer.abort();
    Ok(())
}

fn print_message(message: &parley_core::models::ChatMessage) {
    let time = Local
        .timestamp_millis_opt(message.timestamp)
        .single()
        .map(|t| t.format("%H:%M").to_string())
        .unwrap_or_default();
    println!("[{}] {}: {}", time, message.sender, message.text);
}

// ============================================================================
// status
// ============================================================================

async fn run_status(server: &str) -> anyhow::Result<()> {
    let url = format!("{}/health", server.trim_end_matches('/'));
    match reqwest::get(&url).await {
        Ok(resp) => {
            let status = resp.status();
            let body: serde_json::Value = resp.json().await.unwrap_or_default();
            println!("Relay: {} ({})", body["status"].as_str().unwrap_or("unknown"), status);
            if let Some(version) = body["version"].as_str() {
                println!("Version: {}", version);
            }
        }
        Err(e) => {
            println!("Relay unreachable at {}: {}", url, e);
            std::process::exit(1);
        }
    }
    Ok(())
}

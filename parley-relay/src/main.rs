use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use serenity::all::GatewayIntents;
use serenity::Client;
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};

use parley_core::store::{ConversationStore, RestStore};
use parley_core::ParleyConfig;
use parley_relay::forward::{DiscordOutbound, Outbound};
use parley_relay::state::RelayState;
use parley_relay::{discord, http, watcher};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "parley.toml")]
    config: String,

    /// Probe the Conversation Store and exit.
    #[arg(long)]
    health: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (dev convenience — production uses real env vars)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Init logging
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    // Load config
    let config = match ParleyConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    let store: Arc<dyn ConversationStore> = Arc::new(RestStore::new(&config.store));

    if args.health {
        match store.fetch_snapshot().await {
            Ok(snapshot) => println!("✅ Store reachable: {} conversation(s)", snapshot.len()),
            Err(e) => {
                println!("❌ Store unreachable: {}", e);
                std::process::exit(1);
            }
        }
        return Ok(());
    }

    // Gateway token: config value, else environment. Without it the owner
    // reply path cannot exist, so startup aborts rather than run silently
    // broken.
    let token = config
        .discord
        .bot_token
        .clone()
        .filter(|t| !t.is_empty())
        .or_else(|| std::env::var("DISCORD_BOT_TOKEN").ok());
    let Some(token) = token else {
        eprintln!("DISCORD_BOT_TOKEN not found in config or environment");
        std::process::exit(1);
    };

    // Shutdown fan-out
    let (tx, _rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();

    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to listen for Ctrl+C");
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    let state = Arc::new(RelayState::new());

    let intents =
        GatewayIntents::GUILDS | GatewayIntents::GUILD_MESSAGES | GatewayIntents::MESSAGE_CONTENT;
    let handler = discord::Handler {
        store: store.clone(),
        state: state.clone(),
        channel_id: config.discord.channel_id,
    };
    let mut client = Client::builder(&token, intents)
        .event_handler(handler)
        .await?;

    // Spawn the conversation watcher
    let outbound: Arc<dyn Outbound> = Arc::new(DiscordOutbound::new(
        &config.discord,
        Some(client.http.clone()),
    ));
    let watcher_store = store.clone();
    let watcher_state = state.clone();
    let poll_interval = Duration::from_secs(config.store.poll_interval_seconds.max(1));
    let watcher_shutdown = tx.subscribe();

    tokio::spawn(async move {
        watcher::run_watch_loop(
            watcher_store,
            outbound,
            watcher_state,
            poll_interval,
            watcher_shutdown,
        )
        .await;
    });

    // Spawn the HTTP surface (Notifier + programmatic reply) if enabled
    if config.http.enabled {
        let http_store = store.clone();
        let http_config = config.http.clone();
        let discord_config = config.discord.clone();
        let http_shutdown = tx.subscribe();
        tokio::spawn(async move {
            if let Err(e) =
                http::start_http_server(http_store, http_config, discord_config, http_shutdown)
                    .await
            {
                tracing::error!("HTTP server error: {}", e);
            }
        });
    }

    // Stop the gateway shards when the shutdown signal fires
    let shard_manager = client.shard_manager.clone();
    let mut gateway_shutdown = tx.subscribe();
    tokio::spawn(async move {
        let _ = gateway_shutdown.recv().await;
        shard_manager.shutdown_all().await;
    });

    // Gateway auth/start failure at boot is fatal.
    client.start().await?;

    Ok(())
}

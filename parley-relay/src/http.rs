//! Relay HTTP surface.
//!
//! Hosts the two endpoints the website calls: the fire-and-forget Notifier
//! and the programmatic reply path. Runs alongside the gateway listener and
//! the conversation watcher.
//!
//! Architecture: each endpoint has a thin axum handler that delegates to a
//! pure inner function. The inner functions are directly testable without
//! axum dispatch machinery.
//!
//! Endpoints:
//! - GET  /health      — liveness + version
//! - POST /chat/notify — forward a new-conversation/new-message event to the
//!                       Discord webhook (no-op success when unconfigured)
//! - POST /chat/reply  — append an owner reply to a conversation (optional
//!                       bearer secret)

use std::sync::Arc;

use anyhow::Result;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use parley_core::config::{DiscordConfig, HttpConfig};
use parley_core::models::{Sender, StoredMessage};
use parley_core::store::ConversationStore;

use crate::forward::{self, WebhookPayload};

/// Shared state for all HTTP handlers
pub struct HttpState {
    pub store: Arc<dyn ConversationStore>,
    pub discord: DiscordConfig,
    pub reply_secret: Option<String>,
    pub client: reqwest::Client,
}

/// Build the axum router with all endpoints
pub fn build_router(state: Arc<HttpState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/chat/notify", post(notify_handler))
        .route("/chat/reply", post(reply_handler))
        .with_state(state)
}

/// Start the HTTP server on the configured address.
/// Gracefully shuts down when the broadcast shutdown signal fires.
pub async fn start_http_server(
    store: Arc<dyn ConversationStore>,
    http: HttpConfig,
    discord: DiscordConfig,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let addr = format!("{}:{}", http.host, http.port);
    let state = Arc::new(HttpState {
        store,
        discord,
        reply_secret: http.reply_secret.clone(),
        client: reqwest::Client::new(),
    });

    let app = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Relay HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Request DTOs
// ============================================================================

/// Fields are optional so validation can answer 400 instead of a framework
/// rejection.
#[derive(Debug, Deserialize, Default)]
pub struct NotifyRequest {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    #[serde(rename = "conversationId")]
    pub conversation_id: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ReplyRequest {
    #[serde(rename = "conversationId")]
    pub conversation_id: Option<String>,
    pub message: Option<String>,
}

// ============================================================================
// Inner (directly testable) business logic functions
// ============================================================================

/// Inner health check — liveness only; the store is external and polled
/// elsewhere.
pub fn health_inner() -> serde_json::Value {
    serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    })
}

/// Inner notify — format the event and post it to the webhook.
///
/// Best-effort by contract: an unconfigured webhook is a successful no-op,
/// and nothing here reads or writes the Conversation Store. The watcher may
/// announce the same event independently; duplicates are acceptable.
pub async fn notify_inner(
    client: &reqwest::Client,
    discord: &DiscordConfig,
    req: NotifyRequest,
) -> (StatusCode, serde_json::Value) {
    let Some(conversation_id) = req.conversation_id.filter(|id| !id.trim().is_empty()) else {
        return (
            StatusCode::BAD_REQUEST,
            serde_json::json!({ "error": "Missing conversationId" }),
        );
    };

    let content = match req.kind.as_deref() {
        Some("new_conversation") => forward::format_new_conversation(&conversation_id),
        Some("new_message") => {
            let Some(message) = req.message.filter(|m| !m.trim().is_empty()) else {
                return (
                    StatusCode::BAD_REQUEST,
                    serde_json::json!({ "error": "Missing message" }),
                );
            };
            forward::format_visitor_message(&conversation_id, &message)
        }
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                serde_json::json!({ "error": "Unknown notification type" }),
            );
        }
    };

    let Some(webhook_url) = discord.webhook_url.as_ref().filter(|u| !u.is_empty()) else {
        tracing::info!("No webhook configured; notification dropped for {}", conversation_id);
        return (StatusCode::OK, serde_json::json!({ "success": true }));
    };

    let result = client
        .post(webhook_url)
        .json(&WebhookPayload {
            content,
            username: discord.webhook_username.clone(),
            avatar_url: discord.avatar_url.clone(),
        })
        .send()
        .await
        .and_then(|resp| resp.error_for_status());

    match result {
        Ok(_) => (StatusCode::OK, serde_json::json!({ "success": true })),
        Err(e) => {
            tracing::error!("Notification error: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                serde_json::json!({ "error": "Failed to send notification" }),
            )
        }
    }
}

/// Inner reply — bearer check, validation, store append.
///
/// A rejected request performs no store mutation.
pub async fn reply_inner(
    store: &dyn ConversationStore,
    reply_secret: Option<&str>,
    auth_header: Option<&str>,
    req: ReplyRequest,
) -> (StatusCode, serde_json::Value) {
    if let Some(secret) = reply_secret {
        let expected = format!("Bearer {}", secret);
        if auth_header != Some(expected.as_str()) {
            return (
                StatusCode::UNAUTHORIZED,
                serde_json::json!({ "error": "Unauthorized" }),
            );
        }
    }

    let (Some(conversation_id), Some(message)) = (
        req.conversation_id.filter(|id| !id.trim().is_empty()),
        req.message.filter(|m| !m.trim().is_empty()),
    ) else {
        return (
            StatusCode::BAD_REQUEST,
            serde_json::json!({ "error": "Missing conversationId or message" }),
        );
    };

    let reply = StoredMessage::new(message.clone(), Sender::Daniel);
    match store.append_message(&conversation_id, &reply).await {
        Ok(_) => {
            tracing::info!("Reply sent to conversation {}: {}", conversation_id, message);
            (StatusCode::OK, serde_json::json!({ "success": true }))
        }
        Err(e) => {
            tracing::error!("Reply error: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                serde_json::json!({ "error": "Failed to send reply" }),
            )
        }
    }
}

// ============================================================================
// Axum handler wrappers (thin — delegate to inner functions)
// ============================================================================

pub async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(health_inner()))
}

pub async fn notify_handler(
    State(state): State<Arc<HttpState>>,
    Json(req): Json<NotifyRequest>,
) -> impl IntoResponse {
    let (status, body) = notify_inner(&state.client, &state.discord, req).await;
    (status, Json(body))
}

pub async fn reply_handler(
    State(state): State<Arc<HttpState>>,
    headers: HeaderMap,
    Json(req): Json<ReplyRequest>,
) -> impl IntoResponse {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());
    let (status, body) = reply_inner(
        state.store.as_ref(),
        state.reply_secret.as_deref(),
        auth.as_deref(),
        req,
    )
    .await;
    (status, Json(body))
}

// ============================================================================
// Unit Tests — call inner functions directly
// ============================================================================

//! Conversation watcher — poll, diff, forward.
//!
//! The store delivers full-collection snapshots; there is no "new child"
//! event at the collection level. Change detection therefore diffs message
//! counts per conversation against the previous snapshot. The diff shim is
//! contained here: a store with a real change feed would only need a
//! different `fetch_snapshot` behind the trait.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use parley_core::models::{ConversationRecord, Sender};
use parley_core::store::ConversationStore;

use crate::forward::{self, Outbound};
use crate::state::RelayState;

/// Long-running poll loop. Snapshot failures are logged and the loop keeps
/// going; only the shutdown signal stops it.
pub async fn run_watch_loop(
    store: Arc<dyn ConversationStore>,
    outbound: Arc<dyn Outbound>,
    state: Arc<RelayState>,
    poll_interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    tracing::info!(
        "Conversation watcher started (interval: {}s)",
        poll_interval.as_secs()
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match store.fetch_snapshot().await {
                    Ok(snapshot) => {
                        process_snapshot(&snapshot, outbound.as_ref(), &state).await;
                    }
                    Err(e) => {
                        tracing::warn!("Snapshot fetch failed: {}", e);
                    }
                }
            }
            _ = shutdown.recv() => {
                tracing::info!("Conversation watcher shutting down...");
                break;
            }
        }
    }
}

/// Diff one snapshot against the count map and forward newly arrived
/// visitor messages.
///
/// Owner-authored messages in the delta are the owner's own echo and are
/// never forwarded. The stored count updates unconditionally — even when the
/// delta held no visitor message — so later diffs stay correct.
pub async fn process_snapshot(
    snapshot: &BTreeMap<String, ConversationRecord>,
    outbound: &dyn Outbound,
    state: &RelayState,
) {
    for (conversation_id, record) in snapshot {
        let current = record.message_count();
        let previous = state.last_seen(conversation_id);

        if current > previous {
            for message in record.messages.values().skip(previous) {
                if message.sender != Sender::Visitor {
                    continue;
                }
                let content = forward::format_visitor_message(conversation_id, &message.text);
                match outbound.announce(&content).await {
                    Ok(()) => {
                        tracing::info!(
                            "New visitor message ({}): \"{}\"",
                            conversation_id,
                            message.text
                        );
                    }
                    Err(e) => {
                        tracing::error!("Failed to forward visitor message: {}", e);
                    }
                }
                state.mark_active(conversation_id);
            }
        }

        state.record_count(conversation_id, current);
    }
}

// ============================================================================
// Tests
// ============================================================================

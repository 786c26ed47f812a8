//! WebSocket connection state machine.
//!
//! Handles the read/write loop for a single WebSocket connection,
//! dispatching incoming commands and forwarding filtered events. Refresh
//! commands run on their own task and post their reply back through a
//! channel so the loop keeps streaming progress meanwhile.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};

use super::messages::{WsCommand, WsMessage, WsMessageType};
use super::subscription::SubscriptionManager;
use crate::domain::{DatasetKey, SyncEvent};
use crate::error::SyncError;
use crate::service::MarketService;

/// Replies from background commands waiting to be written.
const REPLY_BUFFER: usize = 16;

/// Runs the read/write loop for a single WebSocket connection.
///
/// - Reads commands from the client and dispatches them.
/// - Forwards matching events from the [`broadcast::Receiver`] to the client.
/// - Writes replies of finished background refreshes.
pub async fn run_connection(
    socket: WebSocket,
    mut event_rx: broadcast::Receiver<SyncEvent>,
    market_service: Arc<MarketService>,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (reply_tx, mut reply_rx) = mpsc::channel::<String>(REPLY_BUFFER);
    let mut subs = SubscriptionManager::new();

    loop {
        tokio::select! {
            // Incoming message from client
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let response = handle_text_message(&text, &mut subs, &market_service, &reply_tx).await;
                        if let Some(resp_json) = response
                            && ws_tx.send(Message::text(resp_json)).await.is_err() {
                                break;
                            }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    _ => {}
                }
            }
            // Reply of a background command
            Some(reply) = reply_rx.recv() => {
                if ws_tx.send(Message::text(reply)).await.is_err() {
                    break;
                }
            }
            // Event from EventBus
            event = event_rx.recv() => {
                match event {
                    Ok(sync_event) => {
                        if subs.matches(sync_event.dataset()) {
                            tracing::trace!(
                                event = sync_event.event_type_str(),
                                dataset = sync_event.dataset(),
                                "forwarding event"
                            );
                            let payload = serde_json::to_value(&sync_event).unwrap_or_default();
                            let Some(json) = WsMessage::event(payload).to_json() else {
                                continue;
                            };
                            if ws_tx.send(Message::text(json)).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(lagged = n, "ws client lagged behind event bus");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    tracing::debug!("ws connection closed");
}

/// Handles a text message from the client, returning an optional JSON
/// response to write immediately.
async fn handle_text_message(
    text: &str,
    subs: &mut SubscriptionManager,
    market_service: &Arc<MarketService>,
    reply_tx: &mpsc::Sender<String>,
) -> Option<String> {
    let Ok(msg) = serde_json::from_str::<WsMessage>(text) else {
        return WsMessage::error("", 400, "malformed JSON").to_json();
    };
    if msg.msg_type != WsMessageType::Command {
        return WsMessage::error(msg.id, 400, "expected a command message").to_json();
    }
    let command = match serde_json::from_value::<WsCommand>(msg.payload) {
        Ok(command) => command,
        Err(err) => return WsMessage::error(msg.id, 404, format!("unknown command: {err}")).to_json(),
    };

    let reply = match command {
        WsCommand::Subscribe { datasets } => {
            subs.subscribe(&datasets);
            WsMessage::new(
                msg.id,
                WsMessageType::Response,
                serde_json::json!({
                    "subscribed": subs.patterns(),
                    "count": subs.count(),
                    "wildcard": subs.is_subscribed_all(),
                }),
            )
        }
        WsCommand::Unsubscribe { datasets } => {
            subs.unsubscribe(&datasets);
            WsMessage::new(
                msg.id,
                WsMessageType::Response,
                serde_json::json!({
                    "unsubscribed": datasets,
                    "remaining_count": subs.count(),
                }),
            )
        }
        WsCommand::Refresh { dataset, force } => {
            let key = match dataset.parse::<DatasetKey>() {
                Ok(key) => key,
                Err(err) => return error_reply(msg.id, &err),
            };
            spawn_refresh(msg.id.clone(), key, force, Arc::clone(market_service), reply_tx.clone());
            WsMessage::new(
                msg.id,
                WsMessageType::Response,
                serde_json::json!({ "accepted": dataset, "force": force }),
            )
        }
        WsCommand::Status => match market_service.venue_summaries().await {
            Ok(venues) => WsMessage::new(
                msg.id,
                WsMessageType::Response,
                serde_json::json!({ "venues": venues }),
            ),
            Err(err) => return error_reply(msg.id, &err),
        },
    };
    reply.to_json()
}

fn error_reply(id: String, err: &SyncError) -> Option<String> {
    WsMessage::error(id, err.error_code(), err.to_string()).to_json()
}

fn spawn_refresh(
    id: String,
    key: DatasetKey,
    force: bool,
    market_service: Arc<MarketService>,
    reply_tx: mpsc::Sender<String>,
) {
    tokio::spawn(async move {
        let reply = match market_service.refresh(&key, force).await {
            Ok(report) => WsMessage::new(
                id,
                WsMessageType::Response,
                serde_json::to_value(&report).unwrap_or_default(),
            )
            .to_json(),
            Err(err) => error_reply(id, &err),
        };
        if let Some(reply) = reply {
            // The connection may already be gone.
            let _ = reply_tx.send(reply).await;
        }
    });
}

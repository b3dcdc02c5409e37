//! WebSocket push of pipeline progress.
//!
//! Connections tap the service's progress broadcast directly: after a
//! client sends `subscribe_documents`, every step and document
//! transition is forwarded as JSON (`{"type": "step", ...}` /
//! `{"type": "document", ...}`), in publish order. Polling the REST
//! endpoints remains equivalent; both read paths observe the same
//! ordered transition sequence.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::ws::{Message, WebSocket};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::service::ExtractionService;

/// Messages sent from client to server
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientMessage {
    /// Keepalive ping
    Ping,
    /// Start receiving pipeline progress events
    SubscribeDocuments,
    /// Stop receiving pipeline progress events
    UnsubscribeDocuments,
}

/// Messages sent from server to client (progress events are forwarded
/// in their own serialized form, not wrapped here)
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServerMessage {
    Pong { timestamp: u64 },
}

/// Handle a WebSocket connection for the lifetime of the socket.
pub async fn handle_ws_connection(socket: WebSocket, service: Arc<ExtractionService>) {
    let session_id = uuid::Uuid::new_v4().to_string();
    info!(session_id = %session_id, "New WebSocket connection");

    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut events = service.progress.subscribe();
    let mut subscribed = false;

    loop {
        tokio::select! {
            incoming = ws_rx.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(ClientMessage::Ping) => {
                                let timestamp = SystemTime::now()
                                    .duration_since(UNIX_EPOCH)
                                    .map(|d| d.as_secs())
                                    .unwrap_or(0);
                                if send_json(&mut ws_tx, &ServerMessage::Pong { timestamp })
                                    .await
                                    .is_err()
                                {
                                    break;
                                }
                            }
                            Ok(ClientMessage::SubscribeDocuments) => {
                                debug!(session_id = %session_id, "Subscribed to progress events");
                                subscribed = true;
                            }
                            Ok(ClientMessage::UnsubscribeDocuments) => {
                                subscribed = false;
                            }
                            Err(e) => {
                                warn!(session_id = %session_id, error = %e, "Unparseable WebSocket message");
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(session_id = %session_id, error = %e, "WebSocket error");
                        break;
                    }
                }
            }
            event = events.recv() => {
                match event {
                    Ok(event) => {
                        if subscribed && send_json(&mut ws_tx, &event).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(missed)) => {
                        // The client can resynchronize by re-polling the store.
                        warn!(session_id = %session_id, missed, "WebSocket client lagged behind progress events");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }

    info!(session_id = %session_id, "WebSocket connection closed");
}

async fn send_json(
    tx: &mut SplitSink<WebSocket, Message>,
    value: &impl Serialize,
) -> Result<(), axum::Error> {
    match serde_json::to_string(value) {
        Ok(json) => tx.send(Message::Text(json.into())).await,
        Err(e) => {
            warn!(error = %e, "Failed to serialize WebSocket message");
            Ok(())
        }
    }
}

//! WebSocket connection handling.

use crate::dispatch::{Flow, dispatch};
use crate::hub::Outbound;
use crate::state::AppState;
use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use poker_types::ClientMessage;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// How long the writer may keep flushing after the reader has finished.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn handle_websocket(socket: WebSocket, state: Arc<AppState>) {
    let id = state.next_connection_id();
    let (mut ws_tx, mut ws_rx) = socket.split();

    let (tx, mut rx) = mpsc::channel::<Outbound>(state.config.outbound_buffer.max(1));
    state.hub.register(id, tx);
    info!(target: "poker::ws", "{} connected", id);

    // Writer: the only place this socket is written to
    let mut send_task = tokio::spawn(async move {
        while let Some(outbound) = rx.recv().await {
            match outbound {
                Outbound::Frame(frame) => {
                    if let Err(e) = ws_tx.send(Message::Text(frame)).await {
                        debug!(target: "poker::ws", "Send failed for {}: {}", id, e);
                        break;
                    }
                }
                Outbound::Close => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    let reader_state = Arc::clone(&state);
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = ws_rx.next().await {
            let msg = match result {
                Ok(msg) => msg,
                Err(e) => {
                    debug!(target: "poker::ws", "Read failed for {}: {}", id, e);
                    break;
                }
            };

            match msg {
                Message::Text(text) => match ClientMessage::decode(text.as_str()) {
                    Ok(client_msg) => {
                        debug!(target: "poker::ws", "{} <- {}", id, client_msg.kind());
                        if dispatch(&reader_state, id, client_msg).await == Flow::Close {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(target: "poker::ws", "Dropping frame from {}: {}", id, e);
                    }
                },
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    let writer_done = tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
            true
        }
        _ = &mut recv_task => false,
    };

    // Drops the outbound sender so the writer drains and exits
    state.hub.disconnect(id);

    if !writer_done {
        if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut send_task)
            .await
            .is_err()
        {
            send_task.abort();
        }
    }

    info!(target: "poker::ws", "{} disconnected", id);
}

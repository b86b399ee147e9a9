//! WebSocket transport for the request channel.
//!
//! Window content opens one socket and exchanges JSON envelopes over it.
//! Each inbound frame is handled on its own task, so a handler awaiting a
//! slow export or download never blocks the other messages; replies and
//! host-initiated broadcasts are funneled through a single writer task.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tracing::debug;

use crate::handlers::dispatch;
use crate::models::OutboundMessage;
use crate::state::AppState;

/// GET /channel - upgrade to the content message channel.
pub async fn channel_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    debug!("window content connected");
    let (mut sink, mut stream) = socket.split();
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<OutboundMessage>();
    let mut events = state.events.subscribe();

    let writer = tokio::spawn(async move {
        loop {
            let message = tokio::select! {
                reply = reply_rx.recv() => match reply {
                    Some(message) => message,
                    None => break,
                },
                event = events.recv() => match event {
                    Ok(message) => message,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "content fell behind on host events");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            };

            let Ok(text) = serde_json::to_string(&message) else {
                continue;
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(message)) = stream.next().await {
        match message {
            Message::Text(text) => {
                let state = state.clone();
                let reply = reply_tx.clone();
                let raw = text.as_str().to_owned();
                tokio::spawn(async move {
                    dispatch(state, raw, reply).await;
                });
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    debug!("window content disconnected");
    writer.abort();
}

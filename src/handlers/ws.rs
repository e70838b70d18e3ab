//! WebSocket transport for live status updates.

use crate::broadcast::next_update;
use crate::state::AppState;
use axum::{
    body::Bytes,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Heartbeat ping interval in seconds.
const HEARTBEAT_INTERVAL_SECS: u64 = 30;

pub async fn status_ws(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let observer = Uuid::new_v4();
    let mut updates = state.broadcaster.subscribe();
    let (mut sender, mut receiver) = socket.split();
    debug!("Observer {} connected", observer);

    let mut heartbeat = tokio::time::interval(Duration::from_secs(HEARTBEAT_INTERVAL_SECS));
    heartbeat.tick().await;
    let mut awaiting_pong = false;

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => awaiting_pong = false,
                    Some(Err(e)) => {
                        debug!("Observer {} socket error: {}", observer, e);
                        break;
                    }
                    _ => {}
                }
            }

            update = next_update(&mut updates) => {
                let Some(update) = update else { break };
                if sender.send(Message::Text(update.into())).await.is_err() {
                    debug!("Observer {} unreachable, dropping", observer);
                    break;
                }
            }

            _ = heartbeat.tick() => {
                if awaiting_pong {
                    debug!("Observer {} missed heartbeat, closing", observer);
                    break;
                }
                if sender.send(Message::Ping(Bytes::new())).await.is_err() {
                    break;
                }
                awaiting_pong = true;
            }
        }
    }

    debug!("Observer {} disconnected", observer);
}

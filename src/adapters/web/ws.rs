//! WebSocket feed of record notifications.

use std::sync::Arc;

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::broadcast;

use super::AppState;
use super::auth::ApiAccess;

pub async fn record_updates(
    State(state): State<Arc<AppState>>,
    _access: ApiAccess,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| relay(socket, state))
}

/// Forward every notification of the configured group to the client and echo
/// back any JSON the client sends. Ends when either side goes away.
async fn relay(socket: WebSocket, state: Arc<AppState>) {
    let group = state.settings.notification_group.clone();
    let mut updates = state.notifier.subscribe(&group);
    let (mut sender, mut receiver) = socket.split();
    tracing::debug!(%group, "websocket subscriber joined");

    loop {
        tokio::select! {
            update = updates.recv() => match update {
                Ok(notification) => {
                    if sender.send(Message::Text(notification.to_json().into())).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(%group, skipped, "websocket subscriber lagging");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    let Ok(content) = serde_json::from_str::<Value>(text.as_str()) else {
                        tracing::debug!("ignoring non-JSON websocket frame");
                        continue;
                    };
                    if sender.send(Message::Text(content.to_string().into())).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            },
        }
    }
    tracing::debug!(%group, "websocket subscriber left");
}

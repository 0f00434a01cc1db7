//! WebSocket changefeed for one document path.
//!
//! On connect the client receives the current value, then one frame per write
//! to that path. Frames are `{"path": ..., "value": ...}` with `value: null`
//! while the document does not exist.

use std::sync::Arc;

use axum::{
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use super::AppState;
use crate::store::{DocumentStore, JsonFileStore, normalize_path};

#[derive(Serialize)]
struct ChangeFrame<'a> {
    path: &'a str,
    value: Option<&'a Value>,
}

pub(super) async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> impl IntoResponse {
    let path = normalize_path(&path).to_string();
    info!(path = %path, "Changefeed client connecting");
    ws.on_upgrade(move |socket| handle_socket(socket, state.store, path))
}

async fn send_frame(socket: &mut WebSocket, path: &str, value: Option<&Value>) -> bool {
    let frame = ChangeFrame { path, value };
    match serde_json::to_string(&frame) {
        Ok(json) => socket.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            warn!(error = %e, "Failed to serialize change frame");
            true
        }
    }
}

/// Read the current value, logging (and treating as absent) on failure.
async fn current_value(store: &JsonFileStore, path: &str) -> Option<Value> {
    match store.get(path).await {
        Ok(value) => value,
        Err(e) => {
            warn!(path = %path, error = %e, "Changefeed read failed");
            None
        }
    }
}

async fn handle_socket(mut socket: WebSocket, store: Arc<JsonFileStore>, path: String) {
    // Subscribe before the initial read so no write slips between them.
    let mut rx = store.subscribe();

    let current = current_value(&store, &path).await;
    if !send_frame(&mut socket, &path, current.as_ref()).await {
        warn!("Failed to send initial value, client disconnected");
        return;
    }

    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(change) if change.path == path => {
                        if !send_frame(&mut socket, &path, change.value.as_ref()).await {
                            debug!("Client disconnected during send");
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(n)) => {
                        warn!(missed = n, path = %path, "Changefeed client lagged behind broadcast");
                        // Re-sync with the latest value.
                        let current = current_value(&store, &path).await;
                        if !send_frame(&mut socket, &path, current.as_ref()).await {
                            break;
                        }
                    }
                    Err(RecvError::Closed) => {
                        debug!("Broadcast channel closed");
                        break;
                    }
                }
            }

            result = socket.recv() => {
                match result {
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!(path = %path, "Changefeed client disconnected");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    debug!(path = %path, "Changefeed connection closed");
}

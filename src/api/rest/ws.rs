use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures::SinkExt;
use futures::StreamExt;
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::state::AppState;

#[derive(Deserialize)]
pub struct TrackingFilter {
    pub tracking_code: Option<String>,
}

/// Live tracking feed. With `?tracking_code=` only that order's rows are sent.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(filter): Query<TrackingFilter>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, filter.tracking_code))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, tracking_code: Option<String>) {
    let (mut sender, mut receiver) = socket.split();
    let mut rx = state.tracking_events_tx.subscribe();

    info!(tracking_code = ?tracking_code, "websocket client connected");

    let send_task = tokio::spawn(async move {
        loop {
            let event = match rx.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "websocket client lagging; tracking events skipped");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };

            if tracking_code
                .as_deref()
                .is_some_and(|code| code != event.tracking_code)
            {
                continue;
            }

            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(err) => {
                    warn!(error = %err, "failed to serialize tracking event for ws");
                    continue;
                }
            };

            if sender.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    let recv_task = tokio::spawn(async move {
        while let Some(Ok(_msg)) = receiver.next().await {}
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    info!("websocket client disconnected");
}

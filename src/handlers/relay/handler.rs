//! Relay WebSocket handler
//!
//! This module provides the WebSocket endpoint that browser clients connect
//! to. Each accepted socket gets its own session: a registry record, an
//! upstream Realtime connection and a relay loop that bridges the two until
//! either side disconnects.

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::core::upstream::{UpstreamConfig, UpstreamLinkEvent};
use crate::errors::RelayResult;
use crate::relay::{RelaySession, SessionRecord};
use crate::state::AppState;

use super::messages::{RelayMessageRoute, RelayOutgoingMessage};

/// Maximum WebSocket frame size (10 MB)
const MAX_WS_FRAME_SIZE: usize = 10 * 1024 * 1024;

/// Maximum WebSocket message size (10 MB)
const MAX_WS_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

/// Status line sent with `connection_error` when the upstream dial fails.
const CONNECTION_FAILED_MESSAGE: &str = "Failed to connect to OpenAI";

/// Relay WebSocket handler
///
/// Upgrades the HTTP connection to WebSocket and hands the socket to a
/// dedicated relay session.
///
/// # Arguments
/// * `ws` - The WebSocket upgrade request from Axum
/// * `state` - Application state containing configuration and the registry
///
/// # Returns
/// * `Response` - HTTP response that upgrades the connection to WebSocket
pub async fn relay_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    info!("relay WebSocket connection upgrade requested");

    ws.max_frame_size(MAX_WS_FRAME_SIZE)
        .max_message_size(MAX_WS_MESSAGE_SIZE)
        .on_upgrade(move |socket| handle_relay_socket(socket, state))
}

/// Handle one relay WebSocket connection from accept to teardown.
async fn handle_relay_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let (route_tx, mut route_rx) = mpsc::unbounded_channel::<RelayMessageRoute>();

    // Sender task for outgoing messages
    let sender_task = tokio::spawn(async move {
        while let Some(route) = route_rx.recv().await {
            let should_close = matches!(route, RelayMessageRoute::Close);

            let result = match route {
                RelayMessageRoute::Outgoing(message) => match serde_json::to_string(&message) {
                    Ok(json) => sender.send(Message::Text(json.into())).await,
                    Err(e) => {
                        error!("Failed to serialize outgoing message: {}", e);
                        continue;
                    }
                },
                RelayMessageRoute::Close => {
                    debug!("Closing relay WebSocket connection");
                    sender.send(Message::Close(None)).await
                }
            };

            if let Err(e) = result {
                debug!("Failed to send WebSocket message: {}", e);
                break;
            }

            if should_close {
                break;
            }
        }
    });

    let session_id = uuid::Uuid::new_v4().to_string();
    let record = state.sessions.register(
        session_id.clone(),
        state.config.openai_realtime_model.clone(),
    );
    info!(session_id = %session_id, "relay WebSocket connection established");

    let (session, upstream_rx) = match establish_session(&state, record.clone(), route_tx.clone())
        .await
    {
        Ok(pair) => pair,
        Err(e) => {
            error!(session_id = %session_id, "upstream connection failed: {}", e);
            let _ = route_tx.send(RelayMessageRoute::Outgoing(
                RelayOutgoingMessage::ConnectionError {
                    message: CONNECTION_FAILED_MESSAGE.to_string(),
                },
            ));
            let _ = route_tx.send(RelayMessageRoute::Close);
            drop(route_tx);
            record.mark_closed();
            state.sessions.remove(&session_id);
            let _ = sender_task.await;
            return;
        }
    };

    // Pump raw client frames into the session loop. The session never
    // touches the socket directly, so a slow upstream cannot stall reads.
    let (client_tx, client_rx) = mpsc::unbounded_channel::<String>();
    let reader_task = tokio::spawn(async move {
        while let Some(frame) = receiver.next().await {
            match frame {
                Ok(Message::Text(text)) => {
                    if client_tx.send(text.to_string()).is_err() {
                        break;
                    }
                }
                Ok(Message::Binary(data)) => {
                    debug!("ignoring binary frame: {} bytes", data.len());
                }
                Ok(Message::Close(_)) => {
                    debug!("relay WebSocket close received");
                    break;
                }
                // Ping/pong are answered by axum
                Ok(_) => {}
                Err(e) => {
                    warn!("relay WebSocket error: {}", e);
                    break;
                }
            }
        }
    });

    session.run(client_rx, upstream_rx).await;

    // Cleanup
    reader_task.abort();
    let _ = sender_task.await;
    state.sessions.remove(&session_id);
    info!(session_id = %session_id, "relay WebSocket connection terminated");
}

/// Build the upstream parameters and dial the Realtime API.
async fn establish_session(
    state: &Arc<AppState>,
    record: Arc<SessionRecord>,
    route_tx: mpsc::UnboundedSender<RelayMessageRoute>,
) -> RelayResult<(RelaySession, mpsc::Receiver<UpstreamLinkEvent>)> {
    let upstream_config = UpstreamConfig::from_server_config(&state.config)?;
    RelaySession::connect(record, &upstream_config, route_tx).await
}

//! WebSocket link to the OpenAI Realtime API.
//!
//! [`UpstreamLink`] owns one authenticated WebSocket connection. Outgoing
//! [`ClientEvent`]s are serialized and written by a background task; incoming
//! text frames are delivered untouched through an event channel so the relay
//! session can parse and dispatch them at its own pace.
//!
//! The link does not reconnect. When the upstream socket closes or fails the
//! task emits a terminal [`UpstreamLinkEvent::Closed`] and exits; the owning
//! session is expected to shut down in response.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use super::config::{OPENAI_BETA_HEADER, UpstreamConfig};
use super::messages::{ClientEvent, SessionConfig};
use crate::errors::{RelayError, RelayResult};

/// Channel capacity for outgoing WebSocket messages.
const WS_SEND_CAPACITY: usize = 256;

/// Channel capacity for incoming upstream events.
const WS_RECV_CAPACITY: usize = 256;

// =============================================================================
// Link events
// =============================================================================

/// Events delivered by the upstream connection task.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamLinkEvent {
    /// A raw JSON text frame received from the upstream API.
    Message(String),
    /// The upstream socket reported a transport error. A `Closed` event
    /// follows; the pair mirrors how the socket itself fails.
    Failed { message: String },
    /// The upstream connection ended. Terminal; no further events follow.
    Closed { reason: String },
}

// =============================================================================
// Upstream link
// =============================================================================

/// Handle to one live upstream Realtime connection.
///
/// Created by [`UpstreamLink::connect`], which also hands back the receiving
/// end of the event channel. Dropping the handle closes the outgoing channel,
/// which makes the background task send a close frame and exit.
#[derive(Debug)]
pub struct UpstreamLink {
    sender: mpsc::Sender<ClientEvent>,
    connected: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl UpstreamLink {
    /// Open a connection and dispatch the initial session configuration.
    ///
    /// The TCP/TLS/WebSocket handshake is bounded by the configured
    /// handshake timeout; the session configuration is enqueued before this
    /// returns so it is the first event the upstream API sees.
    ///
    /// # Errors
    /// Returns `HandshakeFailure` if the handshake fails or exceeds the
    /// timeout.
    pub async fn connect(
        config: &UpstreamConfig,
        session: SessionConfig,
    ) -> RelayResult<(Self, mpsc::Receiver<UpstreamLinkEvent>)> {
        let url = config.url();
        let mut request = url
            .clone()
            .into_client_request()
            .map_err(|e| RelayError::HandshakeFailure(format!("invalid upstream URL: {e}")))?;
        let auth = HeaderValue::from_str(&format!("Bearer {}", config.api_key))
            .map_err(|_| RelayError::HandshakeFailure("API key is not a valid header value".to_string()))?;
        request.headers_mut().insert("Authorization", auth);
        request
            .headers_mut()
            .insert("OpenAI-Beta", HeaderValue::from_static(OPENAI_BETA_HEADER));

        let (ws_stream, _response) = timeout(
            config.handshake_timeout,
            tokio_tungstenite::connect_async(request),
        )
        .await
        .map_err(|_| {
            RelayError::HandshakeFailure(format!(
                "connection timed out after {}s",
                config.handshake_timeout.as_secs()
            ))
        })?
        .map_err(|e| RelayError::HandshakeFailure(e.to_string()))?;

        info!(model = %config.model, "connected to upstream Realtime API");

        let (mut ws_sink, mut ws_source) = ws_stream.split();
        let (sender, mut send_rx) = mpsc::channel::<ClientEvent>(WS_SEND_CAPACITY);
        let (events_tx, events_rx) = mpsc::channel::<UpstreamLinkEvent>(WS_RECV_CAPACITY);
        let connected = Arc::new(AtomicBool::new(true));

        let task_connected = connected.clone();
        let task = tokio::spawn(async move {
            let close_reason: String;

            loop {
                tokio::select! {
                    outgoing = send_rx.recv() => {
                        match outgoing {
                            Some(event) => {
                                let json = match serde_json::to_string(&event) {
                                    Ok(j) => j,
                                    Err(e) => {
                                        error!("failed to serialize client event: {}", e);
                                        continue;
                                    }
                                };
                                if let Err(e) = ws_sink.send(Message::Text(json.into())).await {
                                    error!("failed to send upstream message: {}", e);
                                    task_connected.store(false, Ordering::SeqCst);
                                    let _ = events_tx
                                        .send(UpstreamLinkEvent::Failed { message: e.to_string() })
                                        .await;
                                    close_reason = "send failed".to_string();
                                    break;
                                }
                            }
                            // Link handle dropped; close gracefully.
                            None => {
                                let _ = ws_sink.send(Message::Close(None)).await;
                                close_reason = "link closed".to_string();
                                break;
                            }
                        }
                    }

                    incoming = ws_source.next() => {
                        match incoming {
                            Some(Ok(Message::Text(text))) => {
                                if events_tx
                                    .send(UpstreamLinkEvent::Message(text.as_str().to_owned()))
                                    .await
                                    .is_err()
                                {
                                    close_reason = "event receiver dropped".to_string();
                                    break;
                                }
                            }
                            Some(Ok(Message::Close(frame))) => {
                                debug!("upstream closed the connection");
                                close_reason = frame
                                    .map(|f| f.reason.as_str().to_owned())
                                    .filter(|r| !r.is_empty())
                                    .unwrap_or_else(|| "upstream closed the connection".to_string());
                                break;
                            }
                            Some(Ok(Message::Ping(data))) => {
                                if let Err(e) = ws_sink.send(Message::Pong(data)).await {
                                    warn!("failed to send pong: {}", e);
                                }
                            }
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                error!("upstream socket error: {}", e);
                                task_connected.store(false, Ordering::SeqCst);
                                let _ = events_tx
                                    .send(UpstreamLinkEvent::Failed { message: e.to_string() })
                                    .await;
                                close_reason = "connection error".to_string();
                                break;
                            }
                            None => {
                                close_reason = "connection reset".to_string();
                                break;
                            }
                        }
                    }
                }
            }

            task_connected.store(false, Ordering::SeqCst);
            let _ = events_tx
                .send(UpstreamLinkEvent::Closed { reason: close_reason })
                .await;
            debug!("upstream link task ended");
        });

        let link = Self {
            sender,
            connected,
            task,
        };
        link.send(ClientEvent::SessionUpdate { session }).await?;

        Ok((link, events_rx))
    }

    /// Whether the socket is still believed open.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Enqueue one event for delivery to the upstream API.
    ///
    /// # Errors
    /// Returns `ChannelClosed` once the link has gone down; the caller
    /// decides whether that is a warning or a terminal condition.
    pub async fn send(&self, event: ClientEvent) -> RelayResult<()> {
        if !self.is_connected() {
            return Err(RelayError::ChannelClosed(
                "upstream link is closed".to_string(),
            ));
        }
        self.sender
            .send(event)
            .await
            .map_err(|_| RelayError::ChannelClosed("upstream link is closed".to_string()))
    }

    /// Tear the connection down without waiting for a close handshake.
    pub fn abort(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.task.abort();
    }
}

// =============================================================================
// Tests
// =============================================================================

//! Relay WebSocket route configuration
//!
//! This module configures the WebSocket endpoint browser clients connect to
//! for bidirectional voice relaying.

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::relay::relay_handler;
use crate::state::AppState;
use std::sync::Arc;

/// Create the relay WebSocket router
///
/// # Endpoint
///
/// `GET /ws` - WebSocket upgrade for the voice relay
///
/// # Protocol
///
/// After the upgrade, the server dials the upstream Realtime API and sends
/// `connection_established` once the handshake succeeds. Clients then send
/// JSON text frames:
///
/// ```json
/// // Client streams microphone audio
/// {"type": "audio_data", "audio": "<base64 PCM16>"}
///
/// // Server paces assistant audio back
/// {"type": "audio_delta", "audio": "<base64 PCM16>"}
///
/// // Everything else from the upstream arrives wrapped
/// {"type": "openai_event", "event": {...}}
/// ```
pub fn create_relay_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/ws", get(relay_handler))
        .layer(TraceLayer::new_for_http())
}

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::sessions;
use crate::state::AppState;
use std::sync::Arc;

/// Create the API router with the session query routes
///
/// All routes are read-only; mutation happens only through the relay
/// WebSocket.
pub fn create_api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/status", get(sessions::get_status))
        .route("/api/sessions", get(sessions::list_sessions))
        .route("/api/sessions/{session_id}", get(sessions::get_session))
        .route(
            "/api/sessions/{session_id}/transcript",
            get(sessions::get_session_transcript),
        )
        .route(
            "/api/sessions/{session_id}/recordings",
            get(sessions::get_session_recordings),
        )
        .route(
            "/api/sessions/{session_id}/cost",
            get(sessions::get_session_cost),
        )
        .layer(TraceLayer::new_for_http())
}

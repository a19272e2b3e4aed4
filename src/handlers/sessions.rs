//! Session query handlers
//!
//! Read-only REST surface over the session registry: server status, session
//! listings and per-session transcript, recording and cost views. All
//! responses are JSON; unknown session IDs produce a 404 with an `error`
//! body.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::usage::get_usage_rates;
use crate::relay::SessionRecord;
use crate::state::AppState;

/// Look up a session record or produce the standard 404 response.
fn fetch_record(state: &AppState, session_id: &str) -> Result<Arc<SessionRecord>, Response> {
    match state.sessions.get(session_id) {
        Ok(record) => Ok(record),
        Err(_) => {
            info!("Session lookup failed - session_id={}", session_id);
            Err((
                StatusCode::NOT_FOUND,
                Json(json!({"error": format!("Session not found: {}", session_id)})),
            )
                .into_response())
        }
    }
}

/// Server status with the current number of registered sessions
///
/// Returns `{ status, activeSessions, timestamp, model }`.
pub async fn get_status(State(state): State<Arc<AppState>>) -> Response {
    debug!("Status requested");

    Json(json!({
        "status": "online",
        "activeSessions": state.sessions.active_count(),
        "timestamp": Utc::now().to_rfc3339(),
        "model": state.config.openai_realtime_model,
    }))
    .into_response()
}

/// List all registered sessions with their usage summaries
///
/// Sessions are ordered by creation time. The aggregate estimated cost
/// across all listed sessions is included.
pub async fn list_sessions(State(state): State<Arc<AppState>>) -> Response {
    let summaries: Vec<_> = state
        .sessions
        .list()
        .iter()
        .map(|record| record.summary())
        .collect();
    let total_cost: f64 = summaries
        .iter()
        .map(|summary| summary.usage.estimated_cost_usd)
        .sum();

    debug!("Session list requested - count={}", summaries.len());

    Json(json!({
        "count": summaries.len(),
        "totalEstimatedCostUsd": total_cost,
        "sessions": summaries,
    }))
    .into_response()
}

/// Summary for a single session
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Response {
    let record = match fetch_record(&state, &session_id) {
        Ok(record) => record,
        Err(response) => return response,
    };

    Json(record.summary()).into_response()
}

/// Conversation transcript for a single session
///
/// Entries are ordered oldest first. The retained window is bounded; the
/// total-ever count is available in the session summary.
pub async fn get_session_transcript(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Response {
    let record = match fetch_record(&state, &session_id) {
        Ok(record) => record,
        Err(response) => return response,
    };

    let account = record.account.read();
    let transcript: Vec<_> = account.transcript().cloned().collect();

    Json(json!({
        "sessionId": record.id,
        "count": transcript.len(),
        "transcript": transcript,
    }))
    .into_response()
}

/// Relayed-audio event log for a single session
pub async fn get_session_recordings(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Response {
    let record = match fetch_record(&state, &session_id) {
        Ok(record) => record,
        Err(response) => return response,
    };

    let account = record.account.read();
    let recordings: Vec<_> = account.recordings().cloned().collect();

    Json(json!({
        "sessionId": record.id,
        "count": recordings.len(),
        "audioInputSeconds": account.audio_input_seconds(),
        "audioOutputSeconds": account.audio_output_seconds(),
        "recordings": recordings,
    }))
    .into_response()
}

/// Cost breakdown for a single session
///
/// Each component is the matching counter multiplied by the model's rate;
/// the total is the same arithmetic the session summary reports.
pub async fn get_session_cost(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Response {
    let record = match fetch_record(&state, &session_id) {
        Ok(record) => record,
        Err(response) => return response,
    };

    let account = record.account.read();
    let usage = account.usage();
    let rates = get_usage_rates(account.model());

    let input_token_cost = usage.input_tokens as f64 * rates.input_token_rate;
    let output_token_cost = usage.output_tokens as f64 * rates.output_token_rate;
    let audio_seconds = usage.audio_input_seconds + usage.audio_output_seconds;
    let audio_cost = audio_seconds * rates.audio_second_rate;

    Json(json!({
        "sessionId": record.id,
        "model": account.model(),
        "inputTokens": usage.input_tokens,
        "outputTokens": usage.output_tokens,
        "audioSeconds": audio_seconds,
        "inputTokenCostUsd": input_token_cost,
        "outputTokenCostUsd": output_token_cost,
        "audioCostUsd": audio_cost,
        "estimatedCostUsd": usage.estimated_cost_usd,
    }))
    .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use axum::body::to_bytes;

    fn test_state() -> Arc<AppState> {
        Arc::new(AppState::new(ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            openai_api_key: None,
            openai_realtime_url: "wss://api.openai.com/v1/realtime".to_string(),
            openai_realtime_model: "gpt-4o-realtime-preview".to_string(),
            handshake_timeout_secs: 10,
            cors_allowed_origins: None,
        }))
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_status_reports_session_count() {
        let state = test_state();
        state.sessions.register("s-1", "gpt-4o-realtime-preview");

        let response = get_status(State(state)).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["status"], "online");
        assert_eq!(body["activeSessions"], 1);
        assert_eq!(body["model"], "gpt-4o-realtime-preview");
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_list_sessions_aggregates_cost() {
        let state = test_state();
        let a = state.sessions.register("s-a", "gpt-4o-realtime-preview");
        let b = state.sessions.register("s-b", "gpt-4o-realtime-preview");
        a.account.write().record_token_usage(1000, 500, 1500);
        b.account.write().record_token_usage(2000, 1000, 3000);

        let response = list_sessions(State(state)).await;
        let body = body_json(response).await;

        assert_eq!(body["count"], 2);
        let expected = 3000.0 * (5.0 / 1e6) + 1500.0 * (20.0 / 1e6);
        let total = body["totalEstimatedCostUsd"].as_f64().unwrap();
        assert!((total - expected).abs() < 1e-9);
        assert_eq!(body["sessions"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_get_session_unknown_id_is_404() {
        let state = test_state();

        let response = get_session(State(state), Path("missing".to_string())).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = body_json(response).await;
        assert_eq!(body["error"], "Session not found: missing");
    }

    #[tokio::test]
    async fn test_get_session_summary_shape() {
        let state = test_state();
        state.sessions.register("s-9", "gpt-4o-realtime-preview");

        let response = get_session(State(state), Path("s-9".to_string())).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["id"], "s-9");
        assert_eq!(body["state"], "connecting");
        assert_eq!(body["usage"]["totalTokens"], 0);
    }

    #[tokio::test]
    async fn test_transcript_endpoint_orders_entries() {
        let state = test_state();
        let record = state.sessions.register("s-t", "gpt-4o-realtime-preview");
        {
            let mut account = record.account.write();
            account.add_transcript(crate::relay::SpeakerRole::User, "hello");
            account.add_transcript(crate::relay::SpeakerRole::Assistant, "hi there");
        }

        let response = get_session_transcript(State(state), Path("s-t".to_string())).await;
        let body = body_json(response).await;

        assert_eq!(body["sessionId"], "s-t");
        assert_eq!(body["count"], 2);
        assert_eq!(body["transcript"][0]["role"], "user");
        assert_eq!(body["transcript"][0]["text"], "hello");
        assert_eq!(body["transcript"][1]["role"], "assistant");
    }

    #[tokio::test]
    async fn test_recordings_endpoint_reports_durations() {
        let state = test_state();
        let record = state.sessions.register("s-r", "gpt-4o-realtime-preview");
        {
            let mut account = record.account.write();
            // 48_000 bytes of PCM16 at 24 kHz is exactly one second
            account.record_input_audio(48_000);
            account.record_output_audio(24_000);
        }

        let response = get_session_recordings(State(state), Path("s-r".to_string())).await;
        let body = body_json(response).await;

        assert_eq!(body["count"], 2);
        assert!((body["audioInputSeconds"].as_f64().unwrap() - 1.0).abs() < 1e-9);
        assert!((body["audioOutputSeconds"].as_f64().unwrap() - 0.5).abs() < 1e-9);
        assert_eq!(body["recordings"][0]["role"], "user");
        assert_eq!(body["recordings"][1]["role"], "assistant");
    }

    #[tokio::test]
    async fn test_cost_endpoint_components_sum_to_total() {
        let state = test_state();
        let record = state.sessions.register("s-c", "gpt-4o-realtime-preview");
        {
            let mut account = record.account.write();
            account.record_token_usage(1000, 500, 1500);
            account.record_input_audio(48_000);
        }

        let response = get_session_cost(State(state), Path("s-c".to_string())).await;
        let body = body_json(response).await;

        let input = body["inputTokenCostUsd"].as_f64().unwrap();
        let output = body["outputTokenCostUsd"].as_f64().unwrap();
        let audio = body["audioCostUsd"].as_f64().unwrap();
        let total = body["estimatedCostUsd"].as_f64().unwrap();
        assert!((input + output + audio - total).abs() < 1e-9);
        assert!(total > 0.0);
    }
}

//! Upstream realtime WebSocket message types.
//!
//! This module defines the JSON event types exchanged with the OpenAI
//! Realtime API over the upstream link.
//!
//! # Protocol Overview
//!
//! Client events (sent upstream):
//! - session.update - Replace the session configuration
//! - input_audio_buffer.append - Append audio to the input buffer
//! - input_audio_buffer.commit - Commit the input buffer
//! - response.cancel - Cancel the in-flight response
//!
//! Server events (received from upstream) that the relay acts on:
//! - session.created - Upstream session established
//! - input_audio_buffer.speech_started - VAD detected user speech
//! - input_audio_buffer.speech_stopped - VAD detected silence
//! - conversation.item.input_audio_transcription.completed - User transcript
//! - response.created - Response generation started
//! - response.audio.delta - Assistant audio chunk
//! - response.audio.done - Assistant audio complete
//! - response.audio_transcript.delta - Assistant transcript chunk
//! - response.done - Response complete, carries token usage
//! - error - Upstream-reported error
//!
//! Any other event kind deserializes to [`UpstreamEvent::Unrecognized`] and
//! is forwarded to the client verbatim rather than rejected.

use serde::{Deserialize, Serialize};

use super::config::{
    AUDIO_FORMAT_PCM16, DEFAULT_MAX_RESPONSE_OUTPUT_TOKENS, DEFAULT_MODALITIES,
    DEFAULT_TEMPERATURE, DEFAULT_VAD_PREFIX_PADDING_MS, DEFAULT_VAD_SILENCE_DURATION_MS,
    DEFAULT_VAD_THRESHOLD, RealtimeVoice, SYSTEM_PREAMBLE, TRANSCRIPTION_MODEL,
};

// =============================================================================
// Session Configuration
// =============================================================================

/// Complete session configuration sent upstream via `session.update`.
#[derive(Debug, Clone, Serialize)]
pub struct SessionConfig {
    /// Response modalities (text, audio)
    pub modalities: Vec<String>,

    /// System instructions for the assistant
    pub instructions: String,

    /// Voice for audio output
    pub voice: String,

    /// Input audio format
    pub input_audio_format: String,

    /// Output audio format
    pub output_audio_format: String,

    /// Input audio transcription configuration
    pub input_audio_transcription: InputAudioTranscription,

    /// Turn detection configuration
    pub turn_detection: TurnDetection,

    /// Tool definitions (none are registered by the relay)
    pub tools: Vec<serde_json::Value>,

    /// Tool choice strategy
    pub tool_choice: String,

    /// Temperature for response generation
    pub temperature: f32,

    /// Maximum response output tokens
    pub max_response_output_tokens: u32,
}

/// Input audio transcription configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputAudioTranscription {
    /// Transcription model (e.g., "whisper-1")
    pub model: String,
}

/// Turn detection configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TurnDetection {
    /// Server-side VAD
    #[serde(rename = "server_vad")]
    ServerVad {
        /// Activation threshold
        #[serde(skip_serializing_if = "Option::is_none")]
        threshold: Option<f32>,
        /// Audio prefix padding in ms
        #[serde(skip_serializing_if = "Option::is_none")]
        prefix_padding_ms: Option<u32>,
        /// Silence duration in ms
        #[serde(skip_serializing_if = "Option::is_none")]
        silence_duration_ms: Option<u32>,
    },
}

// =============================================================================
// Voice Configuration
// =============================================================================

/// Desired upstream voice parameters, supplied by the client.
///
/// Every field is optional. [`VoiceConfiguration::resolve`] produces a
/// complete [`SessionConfig`] by filling unset fields with the configured
/// defaults, so a partial update is always expressible as a full
/// `session.update` replacement. Custom instructions are appended after the
/// fixed system preamble, never substituted for it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfiguration {
    /// Response modalities
    pub modalities: Option<Vec<String>>,
    /// Voice identity
    pub voice: Option<RealtimeVoice>,
    /// Sampling temperature
    pub temperature: Option<f32>,
    /// Cap on response output tokens
    pub max_response_output_tokens: Option<u32>,
    /// Turn detection tuning
    pub turn_detection: Option<TurnDetection>,
    /// Free-text custom instructions, appended to the system preamble
    pub instructions: Option<String>,
}

impl VoiceConfiguration {
    /// Resolve into a complete session configuration.
    pub fn resolve(&self) -> SessionConfig {
        let (threshold, prefix_padding_ms, silence_duration_ms) = match self.turn_detection {
            Some(TurnDetection::ServerVad {
                threshold,
                prefix_padding_ms,
                silence_duration_ms,
            }) => (threshold, prefix_padding_ms, silence_duration_ms),
            None => (None, None, None),
        };

        SessionConfig {
            modalities: self.modalities.clone().unwrap_or_else(|| {
                DEFAULT_MODALITIES.iter().map(|m| m.to_string()).collect()
            }),
            instructions: self.resolved_instructions(),
            voice: self.voice.unwrap_or_default().as_str().to_string(),
            input_audio_format: AUDIO_FORMAT_PCM16.to_string(),
            output_audio_format: AUDIO_FORMAT_PCM16.to_string(),
            input_audio_transcription: InputAudioTranscription {
                model: TRANSCRIPTION_MODEL.to_string(),
            },
            turn_detection: TurnDetection::ServerVad {
                threshold: Some(threshold.unwrap_or(DEFAULT_VAD_THRESHOLD)),
                prefix_padding_ms: Some(prefix_padding_ms.unwrap_or(DEFAULT_VAD_PREFIX_PADDING_MS)),
                silence_duration_ms: Some(
                    silence_duration_ms.unwrap_or(DEFAULT_VAD_SILENCE_DURATION_MS),
                ),
            },
            tools: Vec::new(),
            tool_choice: "auto".to_string(),
            temperature: self.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            max_response_output_tokens: self
                .max_response_output_tokens
                .unwrap_or(DEFAULT_MAX_RESPONSE_OUTPUT_TOKENS),
        }
    }

    /// System preamble with any custom instructions appended after it.
    fn resolved_instructions(&self) -> String {
        match self.instructions.as_deref().map(str::trim) {
            Some(custom) if !custom.is_empty() => format!("{SYSTEM_PREAMBLE}\n\n{custom}"),
            _ => SYSTEM_PREAMBLE.to_string(),
        }
    }
}

// =============================================================================
// Client Events (sent upstream)
// =============================================================================

/// Client events sent to the upstream realtime API.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// Replace the session configuration
    #[serde(rename = "session.update")]
    SessionUpdate {
        /// Session configuration
        session: SessionConfig,
    },

    /// Append audio to the input buffer
    #[serde(rename = "input_audio_buffer.append")]
    InputAudioBufferAppend {
        /// Base64-encoded audio data
        audio: String,
    },

    /// Commit the input audio buffer
    #[serde(rename = "input_audio_buffer.commit")]
    InputAudioBufferCommit,

    /// Cancel the current response
    #[serde(rename = "response.cancel")]
    ResponseCancel,
}

// =============================================================================
// Upstream Events (received from upstream)
// =============================================================================

/// Server events received from the upstream realtime API.
///
/// Only the fields the relay consumes are declared; the full raw event text
/// is kept alongside for verbatim forwarding. Unknown event kinds map to
/// [`UpstreamEvent::Unrecognized`].
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum UpstreamEvent {
    /// Error occurred upstream
    #[serde(rename = "error")]
    Error {
        /// Error details
        error: ApiError,
    },

    /// Upstream session established
    #[serde(rename = "session.created")]
    SessionCreated {
        /// Session information
        session: UpstreamSessionInfo,
    },

    /// Speech detection started (user began talking)
    #[serde(rename = "input_audio_buffer.speech_started")]
    SpeechStarted {},

    /// Speech detection stopped (user went silent)
    #[serde(rename = "input_audio_buffer.speech_stopped")]
    SpeechStopped {},

    /// User audio transcription completed
    #[serde(rename = "conversation.item.input_audio_transcription.completed")]
    TranscriptionCompleted {
        /// Transcript text
        #[serde(default)]
        transcript: String,
    },

    /// Response generation started
    #[serde(rename = "response.created")]
    ResponseCreated {},

    /// Assistant audio chunk
    #[serde(rename = "response.audio.delta")]
    AudioDelta {
        /// Base64-encoded audio delta
        delta: String,
    },

    /// Assistant audio complete
    #[serde(rename = "response.audio.done")]
    AudioDone {},

    /// Assistant transcript chunk
    #[serde(rename = "response.audio_transcript.delta")]
    AudioTranscriptDelta {
        /// Transcript delta
        #[serde(default)]
        delta: String,
    },

    /// Response complete
    #[serde(rename = "response.done")]
    ResponseDone {
        /// Response information
        #[serde(default)]
        response: ResponseInfo,
    },

    /// Any event kind the relay has no local handling for
    #[serde(other)]
    Unrecognized,
}

// =============================================================================
// Supporting Types
// =============================================================================

/// Upstream error information.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiError {
    /// Error type
    #[serde(rename = "type", default)]
    pub error_type: Option<String>,
    /// Error code
    #[serde(default)]
    pub code: Option<String>,
    /// Error message
    #[serde(default)]
    pub message: String,
}

/// Upstream session information.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpstreamSessionInfo {
    /// Upstream session ID
    #[serde(default)]
    pub id: String,
}

/// Response information.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResponseInfo {
    /// Response ID
    #[serde(default)]
    pub id: String,
    /// Response status (completed, cancelled, failed...)
    #[serde(default)]
    pub status: String,
    /// Token usage for the response
    pub usage: Option<Usage>,
}

/// Token usage information.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Usage {
    /// Total tokens
    #[serde(default)]
    pub total_tokens: u32,
    /// Input tokens
    #[serde(default)]
    pub input_tokens: u32,
    /// Output tokens
    #[serde(default)]
    pub output_tokens: u32,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_event_serialization() {
        let event = ClientEvent::InputAudioBufferCommit;
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("input_audio_buffer.commit"));

        let event = ClientEvent::ResponseCancel;
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("response.cancel"));
    }

    #[test]
    fn test_audio_append_serialization() {
        let event = ClientEvent::InputAudioBufferAppend {
            audio: "AAEC".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("input_audio_buffer.append"));
        assert!(json.contains("AAEC"));
    }

    #[test]
    fn test_resolve_defaults() {
        let config = VoiceConfiguration::default().resolve();

        assert_eq!(config.modalities, vec!["text", "audio"]);
        assert_eq!(config.voice, "echo");
        assert_eq!(config.instructions, SYSTEM_PREAMBLE);
        assert_eq!(config.input_audio_format, "pcm16");
        assert_eq!(config.output_audio_format, "pcm16");
        assert_eq!(config.input_audio_transcription.model, "whisper-1");
        assert_eq!(config.temperature, DEFAULT_TEMPERATURE);
        assert_eq!(
            config.max_response_output_tokens,
            DEFAULT_MAX_RESPONSE_OUTPUT_TOKENS
        );
        assert_eq!(
            config.turn_detection,
            TurnDetection::ServerVad {
                threshold: Some(DEFAULT_VAD_THRESHOLD),
                prefix_padding_ms: Some(DEFAULT_VAD_PREFIX_PADDING_MS),
                silence_duration_ms: Some(DEFAULT_VAD_SILENCE_DURATION_MS),
            }
        );
    }

    #[test]
    fn test_resolve_appends_custom_instructions() {
        let voice_config = VoiceConfiguration {
            instructions: Some("Only talk about the weather.".to_string()),
            ..Default::default()
        };
        let config = voice_config.resolve();

        assert!(config.instructions.starts_with(SYSTEM_PREAMBLE));
        assert!(config.instructions.ends_with("Only talk about the weather."));
    }

    #[test]
    fn test_resolve_blank_instructions_keep_preamble() {
        let voice_config = VoiceConfiguration {
            instructions: Some("   ".to_string()),
            ..Default::default()
        };
        assert_eq!(voice_config.resolve().instructions, SYSTEM_PREAMBLE);
    }

    #[test]
    fn test_resolve_overrides() {
        let voice_config = VoiceConfiguration {
            voice: Some(RealtimeVoice::Shimmer),
            temperature: Some(0.4),
            max_response_output_tokens: Some(256),
            turn_detection: Some(TurnDetection::ServerVad {
                threshold: Some(0.9),
                prefix_padding_ms: None,
                silence_duration_ms: None,
            }),
            ..Default::default()
        };
        let config = voice_config.resolve();

        assert_eq!(config.voice, "shimmer");
        assert_eq!(config.temperature, 0.4);
        assert_eq!(config.max_response_output_tokens, 256);
        // Partial turn detection tuning falls back per field
        assert_eq!(
            config.turn_detection,
            TurnDetection::ServerVad {
                threshold: Some(0.9),
                prefix_padding_ms: Some(DEFAULT_VAD_PREFIX_PADDING_MS),
                silence_duration_ms: Some(DEFAULT_VAD_SILENCE_DURATION_MS),
            }
        );
    }

    #[test]
    fn test_session_update_serialization_matches_wire_shape() {
        let event = ClientEvent::SessionUpdate {
            session: VoiceConfiguration::default().resolve(),
        };
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "session.update");
        assert_eq!(json["session"]["voice"], "echo");
        assert_eq!(json["session"]["turn_detection"]["type"], "server_vad");
        assert_eq!(json["session"]["turn_detection"]["threshold"], 0.6);
        assert_eq!(json["session"]["tools"], serde_json::json!([]));
        assert_eq!(json["session"]["tool_choice"], "auto");
    }

    #[test]
    fn test_voice_configuration_rejects_unknown_voice() {
        let result: Result<VoiceConfiguration, _> =
            serde_json::from_str(r#"{"voice": "darth_vader"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_upstream_error_deserialization() {
        let json = r#"{
            "type": "error",
            "error": {
                "type": "invalid_request_error",
                "message": "Test error"
            }
        }"#;
        let event: UpstreamEvent = serde_json::from_str(json).unwrap();
        match event {
            UpstreamEvent::Error { error } => {
                assert_eq!(error.message, "Test error");
                assert_eq!(error.error_type.as_deref(), Some("invalid_request_error"));
            }
            _ => panic!("Wrong event type"),
        }
    }

    #[test]
    fn test_upstream_audio_delta_deserialization() {
        let json = r#"{
            "type": "response.audio.delta",
            "response_id": "resp_1",
            "item_id": "item_1",
            "output_index": 0,
            "content_index": 0,
            "delta": "AAECAwQF"
        }"#;
        let event: UpstreamEvent = serde_json::from_str(json).unwrap();
        match event {
            UpstreamEvent::AudioDelta { delta } => assert_eq!(delta, "AAECAwQF"),
            _ => panic!("Wrong event type"),
        }
    }

    #[test]
    fn test_upstream_ignores_extra_fields() {
        let json = r#"{
            "type": "input_audio_buffer.speech_started",
            "audio_start_ms": 1200,
            "item_id": "item_7"
        }"#;
        let event: UpstreamEvent = serde_json::from_str(json).unwrap();
        assert!(matches!(event, UpstreamEvent::SpeechStarted {}));
    }

    #[test]
    fn test_upstream_unknown_kind_maps_to_unrecognized() {
        let json = r#"{"type": "rate_limits.updated", "rate_limits": []}"#;
        let event: UpstreamEvent = serde_json::from_str(json).unwrap();
        assert!(matches!(event, UpstreamEvent::Unrecognized));
    }

    #[test]
    fn test_response_done_usage_extraction() {
        let json = r#"{
            "type": "response.done",
            "response": {
                "id": "resp_9",
                "status": "completed",
                "usage": {
                    "total_tokens": 150,
                    "input_tokens": 100,
                    "output_tokens": 50
                }
            }
        }"#;
        let event: UpstreamEvent = serde_json::from_str(json).unwrap();
        match event {
            UpstreamEvent::ResponseDone { response } => {
                assert_eq!(response.id, "resp_9");
                let usage = response.usage.unwrap();
                assert_eq!(usage.input_tokens, 100);
                assert_eq!(usage.output_tokens, 50);
            }
            _ => panic!("Wrong event type"),
        }
    }

    #[test]
    fn test_transcription_completed_deserialization() {
        let json = r#"{
            "type": "conversation.item.input_audio_transcription.completed",
            "item_id": "item_3",
            "content_index": 0,
            "transcript": "hello there"
        }"#;
        let event: UpstreamEvent = serde_json::from_str(json).unwrap();
        match event {
            UpstreamEvent::TranscriptionCompleted { transcript } => {
                assert_eq!(transcript, "hello there");
            }
            _ => panic!("Wrong event type"),
        }
    }
}

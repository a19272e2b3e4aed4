//! OpenAI Realtime API configuration types.
//!
//! This module contains configuration types for the upstream realtime link:
//! - Model selection
//! - Voice selection
//! - Default session parameters (VAD, temperature, token limits)
//! - Connection parameters derived from the server configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::ServerConfig;
use crate::errors::RelayResult;

/// OpenAI Realtime API WebSocket endpoint.
pub const OPENAI_REALTIME_URL: &str = "wss://api.openai.com/v1/realtime";

/// Protocol version header sent on every upstream handshake.
pub const OPENAI_BETA_HEADER: &str = "realtime=v1";

/// Audio format requested in both directions.
pub const AUDIO_FORMAT_PCM16: &str = "pcm16";

/// Transcription model applied to user audio.
pub const TRANSCRIPTION_MODEL: &str = "whisper-1";

/// Default response modalities.
pub const DEFAULT_MODALITIES: &[&str] = &["text", "audio"];

/// Default server-side VAD activation threshold.
pub const DEFAULT_VAD_THRESHOLD: f32 = 0.6;

/// Default audio carried over from before speech detection, in ms.
pub const DEFAULT_VAD_PREFIX_PADDING_MS: u32 = 200;

/// Default silence needed to end a turn, in ms.
pub const DEFAULT_VAD_SILENCE_DURATION_MS: u32 = 500;

/// Default sampling temperature for response generation.
pub const DEFAULT_TEMPERATURE: f32 = 0.8;

/// Default cap on response output tokens.
pub const DEFAULT_MAX_RESPONSE_OUTPUT_TOKENS: u32 = 4096;

/// Fixed system preamble for the assistant.
///
/// Client-supplied custom instructions are appended after this text, never
/// in place of it.
pub const SYSTEM_PREAMBLE: &str = "You are a helpful real-time voice assistant. \
Keep responses short and conversational, a few sentences at most, and then let the \
user speak. If the audio is unclear, ask the user to repeat themselves rather than \
guessing. Answer in the language the user speaks.";

// =============================================================================
// Models
// =============================================================================

/// Supported OpenAI Realtime models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RealtimeModel {
    /// GPT-4o Realtime Preview model
    #[default]
    #[serde(rename = "gpt-4o-realtime-preview")]
    Gpt4oRealtimePreview,
    /// GPT-4o Realtime Preview 2024-10-01
    #[serde(rename = "gpt-4o-realtime-preview-2024-10-01")]
    Gpt4oRealtimePreview20241001,
    /// GPT-4o Realtime Preview 2024-12-17
    #[serde(rename = "gpt-4o-realtime-preview-2024-12-17")]
    Gpt4oRealtimePreview20241217,
    /// GPT-4o Mini Realtime Preview
    #[serde(rename = "gpt-4o-mini-realtime-preview")]
    Gpt4oMiniRealtimePreview,
    /// GPT-4o Mini Realtime Preview 2024-12-17
    #[serde(rename = "gpt-4o-mini-realtime-preview-2024-12-17")]
    Gpt4oMiniRealtimePreview20241217,
}

impl RealtimeModel {
    /// Convert to the API parameter value.
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gpt4oRealtimePreview => "gpt-4o-realtime-preview",
            Self::Gpt4oRealtimePreview20241001 => "gpt-4o-realtime-preview-2024-10-01",
            Self::Gpt4oRealtimePreview20241217 => "gpt-4o-realtime-preview-2024-12-17",
            Self::Gpt4oMiniRealtimePreview => "gpt-4o-mini-realtime-preview",
            Self::Gpt4oMiniRealtimePreview20241217 => "gpt-4o-mini-realtime-preview-2024-12-17",
        }
    }

    /// Parse from string, with fallback to default.
    pub fn from_str_or_default(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "gpt-4o-realtime-preview" => Self::Gpt4oRealtimePreview,
            "gpt-4o-realtime-preview-2024-10-01" => Self::Gpt4oRealtimePreview20241001,
            "gpt-4o-realtime-preview-2024-12-17" => Self::Gpt4oRealtimePreview20241217,
            "gpt-4o-mini-realtime-preview" => Self::Gpt4oMiniRealtimePreview,
            "gpt-4o-mini-realtime-preview-2024-12-17" => Self::Gpt4oMiniRealtimePreview20241217,
            _ => Self::default(),
        }
    }
}

impl std::fmt::Display for RealtimeModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Voices
// =============================================================================

/// Available voices for the upstream realtime API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RealtimeVoice {
    /// Alloy voice
    Alloy,
    /// Ash voice
    Ash,
    /// Ballad voice
    Ballad,
    /// Coral voice
    Coral,
    /// Echo voice (default)
    #[default]
    Echo,
    /// Sage voice
    Sage,
    /// Shimmer voice
    Shimmer,
    /// Verse voice
    Verse,
}

impl RealtimeVoice {
    /// Convert to the API parameter value.
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Alloy => "alloy",
            Self::Ash => "ash",
            Self::Ballad => "ballad",
            Self::Coral => "coral",
            Self::Echo => "echo",
            Self::Sage => "sage",
            Self::Shimmer => "shimmer",
            Self::Verse => "verse",
        }
    }

    /// Parse from string, with fallback to default.
    pub fn from_str_or_default(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "alloy" => Self::Alloy,
            "ash" => Self::Ash,
            "ballad" => Self::Ballad,
            "coral" => Self::Coral,
            "echo" => Self::Echo,
            "sage" => Self::Sage,
            "shimmer" => Self::Shimmer,
            "verse" => Self::Verse,
            _ => Self::default(),
        }
    }

    /// Get all available voices.
    pub fn all() -> &'static [RealtimeVoice] {
        &[
            Self::Alloy,
            Self::Ash,
            Self::Ballad,
            Self::Coral,
            Self::Echo,
            Self::Sage,
            Self::Shimmer,
            Self::Verse,
        ]
    }
}

impl std::fmt::Display for RealtimeVoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Connection parameters
// =============================================================================

/// Connection parameters for one upstream realtime link.
///
/// Derived from [`ServerConfig`] when a session is established. The API key
/// is cloned per link so the link task does not hold the shared config.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// Bearer credential for the Authorization header
    pub api_key: String,
    /// Endpoint without the model query parameter
    pub endpoint: String,
    /// Model requested via the `model` query parameter
    pub model: RealtimeModel,
    /// Upper bound on connection establishment
    pub handshake_timeout: Duration,
}

impl UpstreamConfig {
    /// Build connection parameters from the server configuration.
    ///
    /// # Errors
    /// Returns `ConfigError` when no API key is configured.
    pub fn from_server_config(config: &ServerConfig) -> RelayResult<Self> {
        Ok(Self {
            api_key: config.require_api_key()?,
            endpoint: config.openai_realtime_url.clone(),
            model: RealtimeModel::from_str_or_default(&config.openai_realtime_model),
            handshake_timeout: Duration::from_secs(config.handshake_timeout_secs),
        })
    }

    /// Full connection URL including the model query parameter.
    pub fn url(&self) -> String {
        format!("{}?model={}", self.endpoint, self.model.as_str())
    }
}

// =============================================================================
// Tests
// =============================================================================

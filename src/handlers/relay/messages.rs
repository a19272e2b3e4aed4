//! Relay WebSocket message types.
//!
//! Defines the browser-facing protocol. Clients stream base64 PCM16 audio
//! and a few control messages; the relay answers with scheduled audio
//! deltas, forwarded upstream events and connection status messages.

use serde::{Deserialize, Serialize};

use crate::core::upstream::VoiceConfiguration;

/// Maximum allowed size for one base64 audio payload (1 MB).
pub const MAX_AUDIO_PAYLOAD_SIZE: usize = 1024 * 1024;

/// Maximum allowed size for custom instructions (100 KB).
pub const MAX_INSTRUCTIONS_SIZE: usize = 100 * 1024;

// =============================================================================
// Incoming Messages (Client -> Relay)
// =============================================================================

/// Incoming WebSocket messages from the browser client.
#[derive(Debug, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum RelayIncomingMessage {
    /// One chunk of microphone audio, base64 PCM16 at 24kHz mono
    #[serde(rename = "audio_data")]
    AudioData {
        /// Base64 encoded PCM16 payload
        audio: String,
    },

    /// Commit the buffered input audio as one user turn
    #[serde(rename = "commit_audio")]
    CommitAudio,

    /// Cancel the response currently being generated
    #[serde(rename = "cancel_response")]
    CancelResponse,

    /// Update the voice configuration mid-session
    #[serde(rename = "update_session")]
    UpdateSession {
        /// Partial configuration; omitted fields keep their defaults
        session: VoiceConfiguration,
    },
}

// =============================================================================
// Outgoing Messages (Relay -> Client)
// =============================================================================

/// Outgoing WebSocket messages to the browser client.
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum RelayOutgoingMessage {
    /// Session is active and ready for audio
    #[serde(rename = "connection_established")]
    ConnectionEstablished {
        /// Relay session ID
        #[serde(rename = "sessionId")]
        session_id: String,
        /// Human readable status line
        message: String,
    },

    /// One scheduled chunk of assistant audio, base64 PCM16
    #[serde(rename = "audio_delta")]
    AudioDelta {
        /// Base64 encoded PCM16 payload
        audio: String,
    },

    /// Upstream event forwarded verbatim
    #[serde(rename = "openai_event")]
    OpenAiEvent {
        /// The upstream event as received
        event: serde_json::Value,
    },

    /// Recoverable error surfaced to the client
    #[serde(rename = "error")]
    Error {
        /// Error message
        message: String,
    },

    /// The upstream connection could not be established
    #[serde(rename = "connection_error")]
    ConnectionError {
        /// Error message
        message: String,
    },

    /// The upstream connection ended; the session is over
    #[serde(rename = "connection_closed")]
    ConnectionClosed {
        /// Reason for closing
        reason: String,
    },
}

// =============================================================================
// Message Routing
// =============================================================================

/// Route for messages leaving the session toward the client socket.
pub enum RelayMessageRoute {
    /// JSON text message
    Outgoing(RelayOutgoingMessage),
    /// Close the client connection
    Close,
}

// =============================================================================
// Validation
// =============================================================================

/// Error type for message validation failures.
#[derive(Debug, Clone)]
pub enum RelayValidationError {
    /// Audio payload exceeds the maximum allowed size
    AudioTooLarge { size: usize, max: usize },
    /// Instructions exceed the maximum allowed size
    InstructionsTooLarge { size: usize, max: usize },
}

impl std::fmt::Display for RelayValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AudioTooLarge { size, max } => {
                write!(f, "Audio payload too large: {} bytes (max: {} bytes)", size, max)
            }
            Self::InstructionsTooLarge { size, max } => {
                write!(
                    f,
                    "Instructions too large: {} bytes (max: {} bytes)",
                    size, max
                )
            }
        }
    }
}

impl std::error::Error for RelayValidationError {}

impl RelayIncomingMessage {
    /// Validates message field sizes to prevent resource exhaustion attacks.
    pub fn validate_size(&self) -> Result<(), RelayValidationError> {
        match self {
            RelayIncomingMessage::AudioData { audio } => {
                let size = audio.len();
                if size > MAX_AUDIO_PAYLOAD_SIZE {
                    return Err(RelayValidationError::AudioTooLarge {
                        size,
                        max: MAX_AUDIO_PAYLOAD_SIZE,
                    });
                }
            }
            RelayIncomingMessage::UpdateSession { session } => {
                if let Some(instructions) = &session.instructions {
                    let size = instructions.len();
                    if size > MAX_INSTRUCTIONS_SIZE {
                        return Err(RelayValidationError::InstructionsTooLarge {
                            size,
                            max: MAX_INSTRUCTIONS_SIZE,
                        });
                    }
                }
            }
            RelayIncomingMessage::CommitAudio | RelayIncomingMessage::CancelResponse => {}
        }
        Ok(())
    }
}

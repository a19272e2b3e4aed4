//! Relay WebSocket handlers
//!
//! This module provides the WebSocket endpoint browser clients use to talk
//! to the upstream OpenAI Realtime API through the relay.
//!
//! # Protocol
//!
//! All frames are JSON text messages.
//!
//! ## Client → Server
//!
//! - **audio_data**: Base64-encoded PCM16 microphone audio
//! - **commit_audio**: Commit the input audio buffer (manual VAD)
//! - **cancel_response**: Cancel the in-flight assistant response
//! - **update_session**: Update voice configuration mid-session
//!
//! ## Server → Client
//!
//! - **connection_established**: Session ready, carries the session ID
//! - **audio_delta**: Base64-encoded PCM16 assistant audio, paced for
//!   gapless playback
//! - **openai_event**: Upstream event forwarded verbatim
//! - **error**: Upstream or validation error
//! - **connection_error**: The upstream could not be reached
//! - **connection_closed**: The upstream link ended

mod handler;
pub mod messages;

pub use handler::relay_handler;

//! OpenAI Realtime API integration.
//!
//! Everything the relay needs to talk to the upstream Realtime API:
//!
//! - [`config`]: endpoint constants, model and voice identifiers, connection
//!   settings derived from the server configuration
//! - [`messages`]: typed client and server events plus the voice
//!   configuration overlay that resolves into a full session configuration
//! - [`client`]: the WebSocket link that carries those events
//!
//! # Example
//!
//! ```rust,ignore
//! use voicebridge::core::upstream::{UpstreamLink, UpstreamConfig, VoiceConfiguration};
//!
//! let config = UpstreamConfig::from_server_config(&server_config)?;
//! let session = VoiceConfiguration::default().resolve();
//! let (link, mut events) = UpstreamLink::connect(&config, session).await?;
//! ```

pub mod client;
pub mod config;
pub mod messages;

pub use client::{UpstreamLink, UpstreamLinkEvent};
pub use config::{
    OPENAI_REALTIME_URL, RealtimeModel, RealtimeVoice, SYSTEM_PREAMBLE, UpstreamConfig,
};
pub use messages::{
    ClientEvent, SessionConfig, TurnDetection, UpstreamEvent, VoiceConfiguration,
};

//! Error types for the relay.
//!
//! The taxonomy follows the failure classes a session can encounter:
//! handshake problems before a session becomes active, link failures that
//! tear a session down, and per-message failures that are contained locally
//! (logged and dropped) without ending the session.

use thiserror::Error;

/// Errors that can occur during relay operations.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Upstream unreachable or rejected within the handshake window.
    /// The session never reaches `Active`.
    #[error("Upstream handshake failed: {0}")]
    HandshakeFailure(String),

    /// Either socket closed or errored after the handshake.
    /// The only class that tears down session state.
    #[error("Link failure: {0}")]
    LinkFailure(String),

    /// Undecodable payload from either side; logged and dropped.
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// An error event reported by the upstream service; forwarded to the
    /// client as a recoverable notice.
    #[error("Upstream reported error: {0}")]
    UpstreamReportedError(String),

    /// Bad audio payload; dropped per fragment, never fatal.
    #[error("Codec failure: {0}")]
    CodecFailure(String),

    /// Unknown session identifier.
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// An internal channel closed while the session was still using it.
    #[error("Channel closed: {0}")]
    ChannelClosed(String),
}

/// Result type for relay operations.
pub type RelayResult<T> = Result<T, RelayError>;

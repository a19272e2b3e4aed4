//! HTTP and WebSocket request handlers
//!
//! This module organizes all API handlers into logical groups:
//! - `relay` - Voice relay WebSocket (browser to OpenAI Realtime API)
//! - `sessions` - Session status, listing, transcript and cost endpoints

pub mod relay;
pub mod sessions;

// Re-export commonly used handlers for convenient access
pub use relay::relay_handler;

pub mod config;
pub mod core;
pub mod errors;
pub mod handlers;
pub mod relay;
pub mod routes;
pub mod state;

// Re-export commonly used items for convenience
pub use config::ServerConfig;
pub use core::*;
pub use errors::{RelayError, RelayResult};
pub use relay::{RelaySession, SessionRegistry};
pub use state::AppState;

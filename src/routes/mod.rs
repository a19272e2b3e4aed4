//! Route configuration
//!
//! Routers are assembled per surface and merged in `main.rs`:
//! - `api` - Read-only session query endpoints under `/api`
//! - `relay` - The `/ws` WebSocket upgrade endpoint

pub mod api;
pub mod relay;

pub use api::create_api_router;
pub use relay::create_relay_router;

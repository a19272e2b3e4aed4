//! Session relay layer.
//!
//! Everything that outlives a single WebSocket frame lives here: the
//! per-session event loop ([`session::RelaySession`]), the process-wide
//! session directory ([`registry::SessionRegistry`]) and the usage ledger
//! each session maintains ([`account::SessionAccount`]).

pub mod account;
pub mod registry;
pub mod session;

// Re-export commonly used types for convenience
pub use account::{RecordingEntry, SessionAccount, SpeakerRole, TranscriptEntry, UsageSnapshot};
pub use registry::{SessionLifecycle, SessionRecord, SessionRegistry, SessionSummary};
pub use session::{CONNECTION_READY_MESSAGE, RelaySession, UPSTREAM_CLOSED_REASON};

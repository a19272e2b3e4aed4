//! Shared registry of live relay sessions.
//!
//! The WebSocket handler registers a session before dialing upstream and
//! removes it when the session ends; the REST endpoints read the records in
//! between. Records are shared as `Arc<SessionRecord>` so a handler holding
//! one across a removal still observes consistent state.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Serialize;
use tracing::debug;

use super::account::{SessionAccount, UsageSnapshot};
use crate::errors::{RelayError, RelayResult};

// =============================================================================
// Session lifecycle
// =============================================================================

/// Lifecycle of a relay session.
///
/// `Connecting` covers the upstream handshake window. `Closed` is terminal;
/// a record never becomes active again after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionLifecycle {
    Connecting,
    Active,
    Closed,
}

impl SessionLifecycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Active => "active",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for SessionLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Session record
// =============================================================================

/// State shared between one session's relay task and the REST API.
#[derive(Debug)]
pub struct SessionRecord {
    pub id: String,
    pub created_at: DateTime<Utc>,
    lifecycle: RwLock<SessionLifecycle>,
    ended_at: RwLock<Option<DateTime<Utc>>>,
    pub account: RwLock<SessionAccount>,
}

impl SessionRecord {
    pub fn new(id: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            created_at: Utc::now(),
            lifecycle: RwLock::new(SessionLifecycle::Connecting),
            ended_at: RwLock::new(None),
            account: RwLock::new(SessionAccount::new(model)),
        }
    }

    pub fn lifecycle(&self) -> SessionLifecycle {
        *self.lifecycle.read()
    }

    pub fn is_active(&self) -> bool {
        self.lifecycle() == SessionLifecycle::Active
    }

    /// Move from `Connecting` to `Active`. A closed record stays closed.
    pub fn mark_active(&self) {
        let mut lifecycle = self.lifecycle.write();
        if *lifecycle == SessionLifecycle::Connecting {
            *lifecycle = SessionLifecycle::Active;
        }
    }

    /// Close the record. Idempotent; the end timestamp is set once.
    pub fn mark_closed(&self) {
        let mut lifecycle = self.lifecycle.write();
        if *lifecycle != SessionLifecycle::Closed {
            *lifecycle = SessionLifecycle::Closed;
            *self.ended_at.write() = Some(Utc::now());
        }
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        *self.ended_at.read()
    }

    /// Listing view with current usage folded in.
    pub fn summary(&self) -> SessionSummary {
        let account = self.account.read();
        let ended_at = self.ended_at();
        let duration = ended_at.unwrap_or_else(Utc::now) - self.created_at;
        SessionSummary {
            id: self.id.clone(),
            state: self.lifecycle(),
            created_at: self.created_at,
            ended_at,
            duration_seconds: duration.num_milliseconds() as f64 / 1000.0,
            model: account.model().to_string(),
            usage: account.usage(),
        }
    }
}

/// Serialized session view served by the sessions API.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: String,
    pub state: SessionLifecycle,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    /// Seconds from creation to end, or to now for a live session
    pub duration_seconds: f64,
    pub model: String,
    pub usage: UsageSnapshot,
}

// =============================================================================
// Registry
// =============================================================================

/// Concurrent map of live sessions, keyed by session ID.
///
/// Cheap to clone; all clones share the same map.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<String, Arc<SessionRecord>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and register a record for a new session.
    pub fn register(&self, id: impl Into<String>, model: impl Into<String>) -> Arc<SessionRecord> {
        let record = Arc::new(SessionRecord::new(id, model));
        self.sessions.insert(record.id.clone(), record.clone());
        debug!(session_id = %record.id, "session registered");
        record
    }

    /// Look up a live session.
    ///
    /// # Errors
    /// Returns `SessionNotFound` for unknown or already removed IDs.
    pub fn get(&self, id: &str) -> RelayResult<Arc<SessionRecord>> {
        self.sessions
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| RelayError::SessionNotFound(id.to_string()))
    }

    /// Drop a session from the registry.
    pub fn remove(&self, id: &str) -> Option<Arc<SessionRecord>> {
        let removed = self.sessions.remove(id).map(|(_, record)| record);
        if removed.is_some() {
            debug!(session_id = %id, "session removed from registry");
        }
        removed
    }

    /// Number of registered sessions.
    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }

    /// Snapshot of all registered sessions, oldest first.
    pub fn list(&self) -> Vec<Arc<SessionRecord>> {
        let mut records: Vec<Arc<SessionRecord>> = self
            .sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        records.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
        records
    }

    /// Close every registered session and clear the map. Used at shutdown.
    pub fn close_all(&self) {
        for entry in self.sessions.iter() {
            entry.value().mark_closed();
        }
        self.sessions.clear();
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_get() {
        let registry = SessionRegistry::new();
        let record = registry.register("sess-1", "gpt-4o-realtime-preview");
        assert_eq!(record.lifecycle(), SessionLifecycle::Connecting);

        let fetched = registry.get("sess-1").unwrap();
        assert_eq!(fetched.id, "sess-1");
        assert_eq!(registry.active_count(), 1);
    }

    #[test]
    fn test_get_unknown_session() {
        let registry = SessionRegistry::new();
        match registry.get("missing") {
            Err(RelayError::SessionNotFound(id)) => assert_eq!(id, "missing"),
            other => panic!("expected SessionNotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_remove_drops_record() {
        let registry = SessionRegistry::new();
        registry.register("sess-1", "gpt-4o-realtime-preview");
        assert!(registry.remove("sess-1").is_some());
        assert!(registry.remove("sess-1").is_none());
        assert!(registry.get("sess-1").is_err());
        assert_eq!(registry.active_count(), 0);
    }

    #[test]
    fn test_lifecycle_transitions() {
        let record = SessionRecord::new("sess-1", "gpt-4o-realtime-preview");
        assert!(!record.is_active());

        record.mark_active();
        assert!(record.is_active());
        assert_eq!(record.ended_at(), None);

        record.mark_closed();
        assert_eq!(record.lifecycle(), SessionLifecycle::Closed);
        let ended = record.ended_at();
        assert!(ended.is_some());

        // Closed is terminal and the end timestamp does not move.
        record.mark_active();
        record.mark_closed();
        assert_eq!(record.lifecycle(), SessionLifecycle::Closed);
        assert_eq!(record.ended_at(), ended);
    }

    #[test]
    fn test_mark_active_only_from_connecting() {
        let record = SessionRecord::new("sess-1", "gpt-4o-realtime-preview");
        record.mark_closed();
        record.mark_active();
        assert_eq!(record.lifecycle(), SessionLifecycle::Closed);
    }

    #[test]
    fn test_list_sorted_by_creation() {
        let registry = SessionRegistry::new();
        registry.register("a", "gpt-4o-realtime-preview");
        registry.register("b", "gpt-4o-realtime-preview");
        registry.register("c", "gpt-4o-realtime-preview");

        let ids: Vec<String> = registry.list().iter().map(|r| r.id.clone()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_close_all_clears_registry() {
        let registry = SessionRegistry::new();
        let record = registry.register("sess-1", "gpt-4o-realtime-preview");
        record.mark_active();

        registry.close_all();
        assert_eq!(registry.active_count(), 0);
        assert_eq!(record.lifecycle(), SessionLifecycle::Closed);
    }

    #[test]
    fn test_summary_reflects_account() {
        let registry = SessionRegistry::new();
        let record = registry.register("sess-1", "gpt-4o-realtime-preview");
        record.account.write().record_token_usage(10, 20, 30);

        let summary = record.summary();
        assert_eq!(summary.id, "sess-1");
        assert_eq!(summary.model, "gpt-4o-realtime-preview");
        assert_eq!(summary.usage.total_tokens, 30);
        assert_eq!(summary.state, SessionLifecycle::Connecting);
        assert!(summary.duration_seconds >= 0.0);
    }

    #[test]
    fn test_concurrent_registration() {
        let registry = SessionRegistry::new();
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    registry.register(format!("sess-{i}"), "gpt-4o-realtime-preview");
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.active_count(), 16);
    }
}

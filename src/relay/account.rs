//! Per-session usage accounting.
//!
//! [`SessionAccount`] is a plain accumulator owned by the session record. It
//! never performs I/O and holds no locks of its own; the session updates it
//! as traffic flows and the REST handlers read snapshots from it. Cost is
//! computed from the current counters on every call, so a reported figure is
//! never stale.
//!
//! Transcript and recording logs are bounded: past the capacity the oldest
//! entry is evicted. The running totals keep counting regardless, so a long
//! session reports accurate counts even after eviction.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::get_usage_rates;
use crate::core::audio;

/// Maximum retained transcript entries per session.
pub const TRANSCRIPT_LOG_CAPACITY: usize = 1000;

/// Maximum retained recording entries per session.
pub const RECORDING_LOG_CAPACITY: usize = 1000;

// =============================================================================
// Log entries
// =============================================================================

/// Which side of the conversation produced an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeakerRole {
    User,
    Assistant,
}

/// One finalized line of conversation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptEntry {
    pub role: SpeakerRole,
    pub text: String,
    pub at: DateTime<Utc>,
}

/// Metadata for one relayed audio fragment.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingEntry {
    pub role: SpeakerRole,
    pub seconds: f64,
    pub bytes: usize,
    pub at: DateTime<Utc>,
}

// =============================================================================
// Usage snapshot
// =============================================================================

/// Point-in-time usage view served by the REST endpoints.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSnapshot {
    pub audio_input_seconds: f64,
    pub audio_output_seconds: f64,
    pub input_fragments: u64,
    pub output_fragments: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    pub transcript_entries: u64,
    pub recording_entries: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_latency_ms: Option<u64>,
    pub estimated_cost_usd: f64,
}

// =============================================================================
// Session account
// =============================================================================

/// Accumulated usage for one relay session.
#[derive(Debug)]
pub struct SessionAccount {
    /// Upstream model name, used to look up cost rates
    model: String,
    audio_input_seconds: f64,
    audio_output_seconds: f64,
    input_fragments: u64,
    output_fragments: u64,
    input_tokens: u64,
    output_tokens: u64,
    total_tokens: u64,
    transcript: VecDeque<TranscriptEntry>,
    transcript_total: u64,
    recordings: VecDeque<RecordingEntry>,
    recordings_total: u64,
    last_latency_ms: Option<u64>,
}

impl SessionAccount {
    /// Create an empty account billed at the given model's rates.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            audio_input_seconds: 0.0,
            audio_output_seconds: 0.0,
            input_fragments: 0,
            output_fragments: 0,
            input_tokens: 0,
            output_tokens: 0,
            total_tokens: 0,
            transcript: VecDeque::new(),
            transcript_total: 0,
            recordings: VecDeque::new(),
            recordings_total: 0,
            last_latency_ms: None,
        }
    }

    /// Record one audio fragment relayed from the client to the upstream.
    ///
    /// Duration is estimated from the PCM byte length at the fixed relay
    /// sample rate.
    pub fn record_input_audio(&mut self, byte_len: usize) {
        let seconds = audio::estimated_seconds(byte_len);
        self.audio_input_seconds += seconds;
        self.input_fragments += 1;
        self.push_recording(RecordingEntry {
            role: SpeakerRole::User,
            seconds,
            bytes: byte_len,
            at: Utc::now(),
        });
    }

    /// Record one audio fragment relayed from the upstream to the client.
    pub fn record_output_audio(&mut self, byte_len: usize) {
        let seconds = audio::estimated_seconds(byte_len);
        self.audio_output_seconds += seconds;
        self.output_fragments += 1;
        self.push_recording(RecordingEntry {
            role: SpeakerRole::Assistant,
            seconds,
            bytes: byte_len,
            at: Utc::now(),
        });
    }

    /// Accumulate token usage reported by the upstream for one response.
    pub fn record_token_usage(&mut self, input: u64, output: u64, total: u64) {
        self.input_tokens += input;
        self.output_tokens += output;
        self.total_tokens += total;
    }

    /// Append a finalized transcript line.
    pub fn add_transcript(&mut self, role: SpeakerRole, text: impl Into<String>) {
        let entry = TranscriptEntry {
            role,
            text: text.into(),
            at: Utc::now(),
        };
        if self.transcript.len() == TRANSCRIPT_LOG_CAPACITY {
            self.transcript.pop_front();
        }
        self.transcript.push_back(entry);
        self.transcript_total += 1;
    }

    /// Record the most recent speech-to-response latency measurement.
    pub fn record_latency_ms(&mut self, latency_ms: u64) {
        self.last_latency_ms = Some(latency_ms);
    }

    /// Estimated cost in USD for everything accumulated so far.
    pub fn cost(&self) -> f64 {
        get_usage_rates(&self.model).estimate_cost(
            self.input_tokens,
            self.output_tokens,
            self.audio_input_seconds + self.audio_output_seconds,
        )
    }

    /// Current usage counters plus the cost they imply.
    pub fn usage(&self) -> UsageSnapshot {
        UsageSnapshot {
            audio_input_seconds: self.audio_input_seconds,
            audio_output_seconds: self.audio_output_seconds,
            input_fragments: self.input_fragments,
            output_fragments: self.output_fragments,
            input_tokens: self.input_tokens,
            output_tokens: self.output_tokens,
            total_tokens: self.total_tokens,
            transcript_entries: self.transcript_total,
            recording_entries: self.recordings_total,
            last_latency_ms: self.last_latency_ms,
            estimated_cost_usd: self.cost(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn audio_input_seconds(&self) -> f64 {
        self.audio_input_seconds
    }

    pub fn audio_output_seconds(&self) -> f64 {
        self.audio_output_seconds
    }

    pub fn total_tokens(&self) -> u64 {
        self.total_tokens
    }

    pub fn last_latency_ms(&self) -> Option<u64> {
        self.last_latency_ms
    }

    /// Retained transcript entries, oldest first.
    pub fn transcript(&self) -> impl Iterator<Item = &TranscriptEntry> {
        self.transcript.iter()
    }

    /// Retained recording entries, oldest first.
    pub fn recordings(&self) -> impl Iterator<Item = &RecordingEntry> {
        self.recordings.iter()
    }

    fn push_recording(&mut self, entry: RecordingEntry) {
        if self.recordings.len() == RECORDING_LOG_CAPACITY {
            self.recordings.pop_front();
        }
        self.recordings.push_back(entry);
        self.recordings_total += 1;
    }
}

// =============================================================================
// Tests
// =============================================================================

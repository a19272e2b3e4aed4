//! Usage rate configuration for session cost accounting.
//!
//! Single source of truth for the per-unit rates the accounting accumulator
//! applies to its counters: a rate per input token, a rate per output token,
//! and a rate per second of audio (applied to input and output seconds
//! combined).
//!
//! These are named tuning constants for an estimate-based accounting model,
//! not a billing reconstruction: audio seconds are derived from payload
//! sizes and the token counts from upstream-reported usage. Treat the
//! resulting cost as an operational estimate.
//!
//! Last updated: 2025-06-30

use std::collections::HashMap;
use std::sync::LazyLock;

// =============================================================================
// Rate Types
// =============================================================================

/// Per-unit usage rates for one upstream model.
#[derive(Debug, Clone)]
pub struct UsageRates {
    /// USD per input token
    pub input_token_rate: f64,
    /// USD per output token
    pub output_token_rate: f64,
    /// USD per second of audio, input and output combined
    pub audio_second_rate: f64,
    /// Optional notes about the rate entry
    pub notes: Option<&'static str>,
}

impl UsageRates {
    /// Create a new rate entry.
    pub const fn new(input_token_rate: f64, output_token_rate: f64, audio_second_rate: f64) -> Self {
        Self {
            input_token_rate,
            output_token_rate,
            audio_second_rate,
            notes: None,
        }
    }

    /// Create a rate entry with notes.
    pub const fn with_notes(
        input_token_rate: f64,
        output_token_rate: f64,
        audio_second_rate: f64,
        notes: &'static str,
    ) -> Self {
        Self {
            input_token_rate,
            output_token_rate,
            audio_second_rate,
            notes: Some(notes),
        }
    }

    /// Estimated cost for the given counters.
    ///
    /// Pure arithmetic over the current counters; callers recompute rather
    /// than caching the result.
    pub fn estimate_cost(
        &self,
        input_tokens: u64,
        output_tokens: u64,
        audio_seconds: f64,
    ) -> f64 {
        input_tokens as f64 * self.input_token_rate
            + output_tokens as f64 * self.output_token_rate
            + audio_seconds * self.audio_second_rate
    }
}

/// Rates applied when a model has no entry of its own.
pub const DEFAULT_USAGE_RATES: UsageRates =
    UsageRates::with_notes(5.0 / 1e6, 20.0 / 1e6, 0.004, "fallback estimate");

// =============================================================================
// Realtime Model Rates
// =============================================================================

/// Usage rate database, keyed by upstream model name (lowercase).
static REALTIME_USAGE_RATES: LazyLock<HashMap<&'static str, UsageRates>> = LazyLock::new(|| {
    let mut m = HashMap::new();

    // -------------------------------------------------------------------------
    // OpenAI Realtime
    // https://openai.com/api/pricing/
    // -------------------------------------------------------------------------
    m.insert(
        "gpt-4o-realtime-preview",
        UsageRates::with_notes(5.0 / 1e6, 20.0 / 1e6, 0.004, "text token rates; blended audio"),
    );
    m.insert(
        "gpt-4o-realtime-preview-2024-10-01",
        UsageRates::new(5.0 / 1e6, 20.0 / 1e6, 0.004),
    );
    m.insert(
        "gpt-4o-realtime-preview-2024-12-17",
        UsageRates::new(5.0 / 1e6, 20.0 / 1e6, 0.004),
    );
    m.insert(
        "gpt-4o-mini-realtime-preview",
        UsageRates::with_notes(0.6 / 1e6, 2.4 / 1e6, 0.001, "mini tier"),
    );
    m.insert(
        "gpt-4o-mini-realtime-preview-2024-12-17",
        UsageRates::new(0.6 / 1e6, 2.4 / 1e6, 0.001),
    );

    m
});

/// Look up the usage rates for a model, falling back to
/// [`DEFAULT_USAGE_RATES`] for unknown models.
pub fn get_usage_rates(model: &str) -> UsageRates {
    REALTIME_USAGE_RATES
        .get(model.to_lowercase().as_str())
        .cloned()
        .unwrap_or(DEFAULT_USAGE_RATES)
}

/// List all models with explicit rate entries.
pub fn list_rated_models() -> Vec<&'static str> {
    let mut models: Vec<&'static str> = REALTIME_USAGE_RATES.keys().copied().collect();
    models.sort_unstable();
    models
}

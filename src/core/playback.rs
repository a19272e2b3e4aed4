//! Gapless playback scheduling for assistant audio.
//!
//! Assistant audio arrives as a burst of small fragments with network jitter.
//! [`PlaybackScheduler`] places each fragment on an output timeline so that
//! units play back-to-back with no gap and no overlap, and supports an
//! immediate stop of everything in flight when the user barges in.
//!
//! Scheduling rule: a fragment's start time is `max(now, cursor)` where the
//! cursor is the end time of the previously scheduled unit. The cursor never
//! moves backwards except through [`PlaybackScheduler::stop_all`], which
//! resets it to the current clock time.
//!
//! Stop semantics: a stop and an in-flight delivery race is resolved by a
//! generation counter checked under the same lock that delivery commits
//! under. A unit that has not reached the sink when `stop_all` runs can
//! never reach it afterwards.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::task::AbortHandle;
use tokio::time::{Duration, Instant, sleep_until};
use tracing::{debug, trace};

use crate::core::audio;
use crate::errors::{RelayError, RelayResult};

// =============================================================================
// Audio sink
// =============================================================================

/// Output device boundary for scheduled audio.
///
/// Both calls must be non-blocking: implementations hand the unit off to a
/// queue or device buffer and return. `play` is invoked while the scheduler
/// holds its internal lock, which is what makes a stop linearizable with
/// respect to in-flight deliveries, so implementations must not call back
/// into the scheduler.
pub trait AudioSink: Send + Sync {
    /// Deliver one unit whose start slot has been reached.
    fn play(&self, unit: PlaybackUnit);

    /// Silence anything the device is currently sounding.
    fn halt(&self);
}

// =============================================================================
// Playback units
// =============================================================================

/// A decoded audio fragment with its slot on the output timeline.
#[derive(Debug, Clone)]
pub struct PlaybackUnit {
    /// Monotonic unit identifier within one scheduler
    pub id: u64,
    /// PCM16 little-endian audio bytes
    pub audio: Bytes,
    /// Absolute start time on the output timeline
    pub start: Instant,
    /// Playback duration derived from the sample count
    pub duration: Duration,
}

impl PlaybackUnit {
    /// End of this unit's slot on the output timeline.
    pub fn end(&self) -> Instant {
        self.start + self.duration
    }
}

// =============================================================================
// Scheduler
// =============================================================================

struct SchedulerState {
    /// Earliest start time available to the next fragment
    next_available_start: Instant,
    /// Bumped by every stop; units from an older generation never commit
    generation: u64,
    /// Identifier handed to the next unit
    next_unit_id: u64,
    /// Delivery tasks for units that have not committed yet
    active: HashMap<u64, AbortHandle>,
}

struct SchedulerInner {
    sink: Arc<dyn AudioSink>,
    state: Mutex<SchedulerState>,
}

/// Schedules assistant audio fragments for gapless sequential output.
///
/// Clone-cheap handle; all clones share one timeline.
#[derive(Clone)]
pub struct PlaybackScheduler {
    inner: Arc<SchedulerInner>,
}

impl PlaybackScheduler {
    /// Create a scheduler delivering to the given sink.
    pub fn new(sink: Arc<dyn AudioSink>) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                sink,
                state: Mutex::new(SchedulerState {
                    next_available_start: Instant::now(),
                    generation: 0,
                    next_unit_id: 0,
                    active: HashMap::new(),
                }),
            }),
        }
    }

    /// Schedule one PCM16 fragment for playback.
    ///
    /// Decodes the fragment to determine its duration, assigns it the next
    /// free slot on the timeline and spawns a delivery task for that slot.
    /// Returns the scheduled unit so the caller can account its duration.
    ///
    /// # Errors
    /// Returns `CodecFailure` for an empty or odd-length payload. The
    /// timeline cursor is not advanced in that case.
    pub fn schedule(&self, pcm: Bytes) -> RelayResult<PlaybackUnit> {
        let samples = audio::decode_pcm16(&pcm)?;
        if samples.is_empty() {
            return Err(RelayError::CodecFailure("empty audio fragment".to_string()));
        }
        let duration = Duration::from_secs_f64(samples.len() as f64 / audio::SAMPLE_RATE_HZ as f64);

        let mut state = self.inner.state.lock();

        let now = Instant::now();
        let start = state.next_available_start.max(now);
        state.next_available_start = start + duration;

        let id = state.next_unit_id;
        state.next_unit_id += 1;

        let unit = PlaybackUnit {
            id,
            audio: pcm,
            start,
            duration,
        };

        let generation = state.generation;
        let inner = Arc::clone(&self.inner);
        let task_unit = unit.clone();
        let handle = tokio::spawn(async move {
            sleep_until(task_unit.start).await;

            let mut state = inner.state.lock();
            state.active.remove(&task_unit.id);
            if state.generation == generation {
                // Commit point: still under the lock a concurrent stop_all
                // would have to take first.
                trace!(unit = task_unit.id, "playback unit committed");
                inner.sink.play(task_unit);
            }
        })
        .abort_handle();
        state.active.insert(id, handle);

        debug!(
            unit = id,
            start_in_ms = start.saturating_duration_since(now).as_millis() as u64,
            duration_ms = duration.as_millis() as u64,
            "scheduled playback unit"
        );

        Ok(unit)
    }

    /// Halt all in-flight and queued units and reset the timeline.
    ///
    /// After this returns, no unit scheduled before the call can reach the
    /// sink, the active set is empty and the next fragment starts from the
    /// current clock time. The sink itself is told to silence whatever it
    /// is already sounding.
    pub fn stop_all(&self) {
        let dropped = {
            let mut state = self.inner.state.lock();
            state.generation += 1;
            state.next_available_start = Instant::now();
            let dropped = state.active.len();
            for (_, handle) in state.active.drain() {
                handle.abort();
            }
            dropped
        };

        self.inner.sink.halt();
        debug!(dropped, "playback stopped, timeline reset");
    }

    /// Number of units scheduled but not yet delivered.
    pub fn pending_units(&self) -> usize {
        self.inner.state.lock().active.len()
    }
}

// =============================================================================
// Tests
// =============================================================================

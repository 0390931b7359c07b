//! The "TIME" Engine - Playback Clock
//!
//! Maps real elapsed time onto the recorded history. The clock owns the
//! simulated time (`elapsed_millis`), the direction and the speed, and turns
//! every tick into at most one index change. Consumers hear about index
//! changes through a `PlaybackObserver` passed into each call, so callback
//! ordering is explicit at the call site.

use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::frame::{self, Direction};
use crate::record::{CargoType, Record, RecordSequence};

/// Two elapsed values closer than this are "the same instant", and an
/// elapsed value this close to an edge counts as being on it.
const BOUNDARY_EPSILON_MILLIS: f64 = 0.1;

// ============================================================================
// OBSERVER
// ============================================================================

/// Receives playback notifications.
///
/// Both methods default to no-ops; `()` is the null observer.
pub trait PlaybackObserver {
    /// The displayed record changed; re-pose the scene.
    fn frame_changed(&mut self, _index: usize, _records: &RecordSequence) {}

    /// Slider position / timestamp text must be re-synced.
    ///
    /// Also fired on initialize and reset, even for an empty history, so
    /// controls can be disabled.
    fn timeline_changed(&mut self, _index: usize, _records: &RecordSequence) {}
}

impl PlaybackObserver for () {}

// ============================================================================
// STATE SNAPSHOT
// ============================================================================

/// Serializable snapshot of the clock for UIs and exports.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaybackState {
    pub is_playing: bool,
    pub direction: Direction,
    pub speed: f64,
    pub elapsed_millis: f64,
    pub current_index: usize,
    pub total_duration_millis: f64,
    pub record_count: usize,
    /// False when there are fewer than two records to animate between
    pub controls_enabled: bool,
}

// ============================================================================
// PLAYBACK CLOCK
// ============================================================================

/// Seekable, variable-speed, bidirectional playback over a `RecordSequence`.
#[derive(Debug, Clone)]
pub struct PlaybackClock {
    records: RecordSequence,
    is_playing: bool,
    direction: Direction,
    speed: f64,
    elapsed_millis: f64,
    current_index: usize,
    total_duration_millis: f64,
}

impl Default for PlaybackClock {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackClock {
    /// A clock over an empty history.
    pub fn new() -> Self {
        Self {
            records: RecordSequence::empty(),
            is_playing: false,
            direction: Direction::Forward,
            speed: 1.0,
            elapsed_millis: 0.0,
            current_index: 0,
            total_duration_millis: 0.0,
        }
    }

    /// Creates a clock and initializes it with `records`.
    pub fn with_records(records: RecordSequence, observer: &mut dyn PlaybackObserver) -> Self {
        let mut clock = Self::new();
        clock.initialize(records, observer);
        clock
    }

    /// Replaces the history and resets all state: paused, forward, 1x, index 0.
    pub fn initialize(&mut self, records: RecordSequence, observer: &mut dyn PlaybackObserver) {
        self.total_duration_millis = records.total_duration_millis() as f64;
        self.records = records;
        self.is_playing = false;
        self.direction = Direction::Forward;
        self.speed = 1.0;
        self.elapsed_millis = 0.0;
        self.current_index = 0;

        debug!(
            records = self.records.len(),
            duration_ms = self.total_duration_millis,
            "playback initialized"
        );

        observer.timeline_changed(self.current_index, &self.records);
    }

    /// Drops the history and returns to the initial state.
    pub fn reset(&mut self, observer: &mut dyn PlaybackObserver) {
        self.initialize(RecordSequence::empty(), observer);
    }

    /// Advances simulated time by `real_delta_secs` of wall-clock time.
    ///
    /// No-op unless playing with at least two records. Reaching the edge of
    /// the history in the direction of travel pauses playback.
    pub fn advance(&mut self, real_delta_secs: f64, observer: &mut dyn PlaybackObserver) {
        if !self.is_playing || self.records.len() < 2 || !real_delta_secs.is_finite() {
            return;
        }

        let time_step = real_delta_secs * 1000.0 * self.speed * self.direction.sign();
        let new_elapsed = (self.elapsed_millis + time_step).clamp(0.0, self.total_duration_millis);

        if (new_elapsed - self.elapsed_millis).abs() < BOUNDARY_EPSILON_MILLIS
            && self.is_at_boundary(new_elapsed)
        {
            self.elapsed_millis = new_elapsed;
            self.is_playing = false;

            // Records sharing the edge time all resolve to the first of them,
            // so land on the edge record itself.
            let index = self.edge_index();
            if index != self.current_index {
                self.publish(index, observer);
            }
            debug!(index = self.current_index, "end of history, playback stopped");
            return;
        }

        self.elapsed_millis = new_elapsed;

        let index = self.resolve_index(new_elapsed);
        if index != self.current_index {
            self.publish(index, observer);

            // Several records can share a relative time, so one tick may
            // jump straight onto the trailing record.
            if self.is_at_trailing_index() {
                self.is_playing = false;
                debug!(index = self.current_index, "trailing record reached, playback stopped");
            }
        }
    }

    /// Flips play/pause and returns the new playing state.
    ///
    /// With fewer than two records nothing changes. Starting playback from
    /// the trailing edge rewinds to the opposite edge first, so a finished
    /// replay restarts instead of stopping again immediately.
    pub fn toggle_play_pause(&mut self, observer: &mut dyn PlaybackObserver) -> bool {
        if self.records.len() < 2 {
            return self.is_playing;
        }

        self.is_playing = !self.is_playing;

        if self.is_playing {
            let last = self.records.last_index();
            match self.direction {
                Direction::Forward if self.current_index >= last => {
                    self.elapsed_millis = 0.0;
                    self.publish(0, observer);
                }
                Direction::Backward if self.current_index == 0 => {
                    self.elapsed_millis = self.total_duration_millis;
                    self.publish(last, observer);
                }
                _ => {}
            }
        }

        self.is_playing
    }

    /// Reverses playback direction without touching time or index.
    pub fn toggle_direction(&mut self) {
        self.direction = self.direction.reversed();
    }

    /// Sets the speed multiplier. Non-positive or non-finite values are ignored.
    pub fn set_speed(&mut self, multiplier: f64) {
        if !multiplier.is_finite() || multiplier <= 0.0 {
            warn!(multiplier, "ignoring invalid playback speed");
            return;
        }
        self.speed = multiplier;
    }

    /// Jumps to `index`, clamped into range, and resyncs simulated time.
    pub fn seek(&mut self, index: i64, observer: &mut dyn PlaybackObserver) {
        if self.records.is_empty() {
            return;
        }

        let last = self.records.last_index() as i64;
        let clamped = index.clamp(0, last) as usize;
        if clamped != self.current_index {
            self.elapsed_millis = self.records.relative_millis_at(clamped) as f64;
            self.publish(clamped, observer);
        }
    }

    /// Resolves a relative time to a record index, anchored at the current index.
    pub fn resolve_index(&self, time_millis: f64) -> usize {
        frame::resolve_index(&self.records, self.current_index, self.direction, time_millis)
    }

    /// Re-publishes the current frame (after the analytics merge, for example).
    pub fn refresh(&self, observer: &mut dyn PlaybackObserver) {
        if !self.records.is_empty() {
            observer.frame_changed(self.current_index, &self.records);
        }
    }

    /// Applies classifier cargo types to the whole history in one step.
    pub fn annotate_cargo_types(&mut self, assignments: &HashMap<usize, Option<CargoType>>) {
        self.records.apply_cargo_types(assignments);
    }

    // ========== Accessors ==========

    pub fn records(&self) -> &RecordSequence {
        &self.records
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn current_record(&self) -> Option<&Record> {
        self.records.get(self.current_index)
    }

    pub fn elapsed_millis(&self) -> f64 {
        self.elapsed_millis
    }

    pub fn total_duration_millis(&self) -> f64 {
        self.total_duration_millis
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn state(&self) -> PlaybackState {
        PlaybackState {
            is_playing: self.is_playing,
            direction: self.direction,
            speed: self.speed,
            elapsed_millis: self.elapsed_millis,
            current_index: self.current_index,
            total_duration_millis: self.total_duration_millis,
            record_count: self.records.len(),
            controls_enabled: self.records.len() >= 2,
        }
    }

    // ========== Private Helper Methods ==========

    fn publish(&mut self, index: usize, observer: &mut dyn PlaybackObserver) {
        self.current_index = index;
        observer.frame_changed(index, &self.records);
        observer.timeline_changed(index, &self.records);
    }

    fn is_at_boundary(&self, elapsed: f64) -> bool {
        match self.direction {
            Direction::Forward => elapsed >= self.total_duration_millis - BOUNDARY_EPSILON_MILLIS,
            Direction::Backward => elapsed <= BOUNDARY_EPSILON_MILLIS,
        }
    }

    /// The record playback stops on in the current direction.
    fn edge_index(&self) -> usize {
        match self.direction {
            Direction::Forward => self.records.last_index(),
            Direction::Backward => 0,
        }
    }

    fn is_at_trailing_index(&self) -> bool {
        self.current_index == self.edge_index()
    }
}

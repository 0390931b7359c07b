//! Replay Session - one playback of one history.
//!
//! Owns the clock, the path trail and the analytics state, and routes clock
//! notifications to the caller's observer. Analytics run in a background task
//! and report back through a channel; every message carries the generation
//! it was started under, and messages from an earlier generation are dropped
//! on arrival.

use crane_env::{ReplayContext, SessionId, ZoneClassifier};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::analytics::{AnalyticsConfig, AnalyticsReport, ZoneAggregator};
use crate::cargo::CargoHeuristic;
use crate::frame::FrameView;
use crate::path::{PathConfig, PathPoint, PathRecorder};
use crate::playback::{PlaybackClock, PlaybackObserver, PlaybackState};
use crate::record::RecordSequence;

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub path: PathConfig,
    pub heuristic: CargoHeuristic,
    pub analytics: AnalyticsConfig,
}

// ============================================================================
// OBSERVER PLUMBING
// ============================================================================

struct AnalyticsMessage {
    generation: u64,
    report: AnalyticsReport,
}

/// Feeds the path trail, then forwards to the caller's observer.
struct FrameSink<'a> {
    path: &'a mut PathRecorder,
    heuristic: &'a CargoHeuristic,
    now: Duration,
    inner: &'a mut dyn PlaybackObserver,
}

impl PlaybackObserver for FrameSink<'_> {
    fn frame_changed(&mut self, index: usize, records: &RecordSequence) {
        if let Some(record) = records.get(index) {
            let previous = index.checked_sub(1).and_then(|i| records.get(i));
            self.path.record(
                self.now,
                record.hook_position(),
                record.weight_or_zero(),
                record.timestamp_millis,
                self.heuristic.resolve(previous, record),
            );
        }
        self.inner.frame_changed(index, records);
    }

    fn timeline_changed(&mut self, index: usize, records: &RecordSequence) {
        self.inner.timeline_changed(index, records);
    }
}

// ============================================================================
// REPLAY SESSION
// ============================================================================

pub struct ReplaySession {
    id: SessionId,
    generation: u64,
    clock: PlaybackClock,
    path: PathRecorder,
    heuristic: CargoHeuristic,
    aggregator: ZoneAggregator,
    analytics: Option<AnalyticsReport>,
    analytics_pending: bool,
    last_tick: Duration,
    tx: mpsc::UnboundedSender<AnalyticsMessage>,
    rx: mpsc::UnboundedReceiver<AnalyticsMessage>,
    observer: Box<dyn PlaybackObserver + Send>,
}

impl ReplaySession {
    pub fn new(config: SessionConfig, observer: Box<dyn PlaybackObserver + Send>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            id: SessionId::new(),
            generation: 0,
            clock: PlaybackClock::new(),
            path: PathRecorder::new(config.path),
            heuristic: config.heuristic,
            aggregator: ZoneAggregator::new(config.analytics),
            analytics: None,
            analytics_pending: false,
            last_tick: Duration::ZERO,
            tx,
            rx,
            observer,
        }
    }

    /// A session without an observer.
    pub fn headless(config: SessionConfig) -> Self {
        Self::new(config, Box::new(()))
    }

    /// Starts a new session over `records`.
    ///
    /// Any analytics still in flight for the previous history will be ignored.
    pub fn load(&mut self, records: RecordSequence) {
        self.begin_generation();
        info!(session = %self.id, records = records.len(), "history loaded");
        let (clock, mut sink) = self.clock_and_sink(self.last_tick);
        clock.initialize(records, &mut sink);
    }

    /// Drops the history and returns to the empty state.
    pub fn reset(&mut self) {
        self.begin_generation();
        debug!(session = %self.id, "session reset");
        let (clock, mut sink) = self.clock_and_sink(self.last_tick);
        clock.reset(&mut sink);
    }

    /// Snapshots the history and classifies it in the background.
    ///
    /// Returns false (and records a `Skipped` report) when the history is too
    /// short to analyse.
    pub fn start_analytics<C: ReplayContext>(
        &mut self,
        ctx: &C,
        classifier: Arc<dyn ZoneClassifier>,
    ) -> bool {
        let Some(request) = self.aggregator.prepare(self.clock.records()) else {
            self.analytics = Some(AnalyticsReport::skipped());
            return false;
        };

        let aggregator = self.aggregator.clone();
        let tx = self.tx.clone();
        let generation = self.generation;

        info!(
            session = %self.id,
            classifier = classifier.name(),
            points = request.points.len(),
            "analytics started"
        );

        ctx.spawn("zone-analytics", async move {
            let report = aggregator.execute(&request, classifier.as_ref()).await;
            if tx.send(AnalyticsMessage { generation, report }).is_err() {
                debug!(generation, "session closed before analytics finished");
            }
        });

        self.analytics_pending = true;
        true
    }

    /// Applies a finished analytics result, if one has arrived.
    ///
    /// The cargo annotation is applied to the whole history before the
    /// current frame is re-published. Returns true if a result was applied.
    pub fn poll_analytics(&mut self) -> bool {
        let mut applied = false;

        while let Ok(message) = self.rx.try_recv() {
            if message.generation != self.generation {
                debug!(
                    stale = message.generation,
                    live = self.generation,
                    "discarding stale analytics"
                );
                continue;
            }

            self.clock
                .annotate_cargo_types(&message.report.result.cargo_map());
            self.analytics = Some(message.report);
            self.analytics_pending = false;
            applied = true;
        }

        if applied {
            let (clock, mut sink) = self.clock_and_sink(self.last_tick);
            clock.refresh(&mut sink);
        }
        applied
    }

    /// One render-loop step: merge analytics, then advance playback.
    pub fn tick(&mut self, real_delta_secs: f64, now: Duration) {
        self.last_tick = now;
        self.poll_analytics();
        let (clock, mut sink) = self.clock_and_sink(now);
        clock.advance(real_delta_secs, &mut sink);
    }

    // ========== Controls ==========

    pub fn toggle_play_pause(&mut self) -> bool {
        let (clock, mut sink) = self.clock_and_sink(self.last_tick);
        clock.toggle_play_pause(&mut sink)
    }

    pub fn toggle_direction(&mut self) {
        self.clock.toggle_direction();
    }

    pub fn set_speed(&mut self, multiplier: f64) {
        self.clock.set_speed(multiplier);
    }

    pub fn seek(&mut self, index: i64) {
        let (clock, mut sink) = self.clock_and_sink(self.last_tick);
        clock.seek(index, &mut sink);
    }

    // ========== Accessors ==========

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn clock(&self) -> &PlaybackClock {
        &self.clock
    }

    pub fn state(&self) -> PlaybackState {
        self.clock.state()
    }

    pub fn current_frame(&self) -> Option<FrameView> {
        FrameView::at(self.clock.records(), self.clock.current_index(), &self.heuristic)
    }

    pub fn path(&self) -> &PathRecorder {
        &self.path
    }

    pub fn path_points(&self) -> Vec<PathPoint> {
        self.path.to_vec()
    }

    /// The last applied (or skipped) analytics report for this history.
    pub fn analytics(&self) -> Option<&AnalyticsReport> {
        self.analytics.as_ref()
    }

    pub fn analytics_pending(&self) -> bool {
        self.analytics_pending
    }

    /// Splits out the clock and an observer over the remaining fields.
    fn clock_and_sink(&mut self, now: Duration) -> (&mut PlaybackClock, FrameSink<'_>) {
        let sink = FrameSink {
            path: &mut self.path,
            heuristic: &self.heuristic,
            now,
            inner: &mut *self.observer,
        };
        (&mut self.clock, sink)
    }

    fn begin_generation(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        self.id = SessionId::new();
        self.analytics = None;
        self.analytics_pending = false;
        self.path.clear();
    }
}

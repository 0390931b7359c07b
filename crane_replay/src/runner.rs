//! Replay runner - drives a session through a history on a virtual clock.

use crate::context::VirtualContext;
use crate::controls::ControlScript;
use crate::exporter::{ExportFrame, ReplayExport};

use crane_core::{AnalyticsStatus, RecordSequence, ReplaySession, SessionConfig};
use crane_env::{ReplayContext, ZoneClassifier};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Render-loop rate in Hz (default: 30)
    pub tick_rate_hz: u32,

    /// Hard stop on virtual time in seconds (default: 3600)
    pub max_duration_secs: f64,

    /// Playback speed multiplier applied before starting (default: 1.0)
    pub speed: f64,

    /// Export a frame every N ticks (default: 30)
    pub export_every_ticks: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: 30,
            max_duration_secs: 3_600.0,
            speed: 1.0,
            export_every_ticks: 30,
        }
    }
}

// ============================================================================
// SUMMARY
// ============================================================================

/// Results from one replay.
#[derive(Debug, Clone, Serialize)]
pub struct ReplaySummary {
    /// Session identifier
    pub session: String,

    /// Records in the history
    pub records: usize,

    /// Ticks executed
    pub ticks: u64,

    /// Virtual time spent replaying, in seconds
    pub virtual_secs: f64,

    /// Index displayed when the run ended
    pub final_index: usize,

    /// Playback stopped on its own (end of history) rather than by the time cap
    pub finished: bool,

    /// Points in the hook trail
    pub path_points: usize,

    /// Analytics outcome, if analytics were requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analytics: Option<AnalyticsStatus>,

    pub loading_zones: usize,
    pub unloading_zones: usize,
    pub concrete_operations: usize,
}

// ============================================================================
// RUNNER
// ============================================================================

/// Replays histories headlessly.
pub struct ReplayRunner {
    config: RunnerConfig,
    session_config: SessionConfig,
    script: ControlScript,
    classifier: Option<Arc<dyn ZoneClassifier>>,
}

impl ReplayRunner {
    pub fn new(config: RunnerConfig, session_config: SessionConfig) -> Self {
        Self {
            config,
            session_config,
            script: ControlScript::default(),
            classifier: None,
        }
    }

    /// Sets the tick rate.
    pub fn with_tick_rate(mut self, hz: u32) -> Self {
        self.config.tick_rate_hz = hz.max(1);
        self
    }

    /// Sets the maximum virtual duration.
    pub fn with_duration(mut self, secs: f64) -> Self {
        self.config.max_duration_secs = secs;
        self
    }

    /// Sets the starting speed.
    pub fn with_speed(mut self, speed: f64) -> Self {
        self.config.speed = speed;
        self
    }

    /// Sets the scripted controls.
    pub fn with_script(mut self, script: ControlScript) -> Self {
        self.script = script;
        self
    }

    /// Enables background analytics with `classifier`.
    pub fn with_classifier(mut self, classifier: Arc<dyn ZoneClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Replays `records` from the first record until playback stops, the
    /// script is exhausted, and analytics (if any) have settled.
    pub async fn run(
        &self,
        records: RecordSequence,
        mut export: Option<&mut ReplayExport>,
    ) -> ReplaySummary {
        let start_millis = records.get(0).map(|r| r.timestamp_millis).unwrap_or(0);
        let ctx = VirtualContext::starting_at_millis(start_millis);
        let mut session = ReplaySession::headless(self.session_config);
        let mut script = self.script.clone();

        session.load(records);
        info!(
            session = %session.id(),
            records = session.state().record_count,
            speed = self.config.speed,
            "replay starting"
        );

        if let Some(classifier) = &self.classifier {
            session.start_analytics(&ctx, Arc::clone(classifier));
        }

        session.set_speed(self.config.speed);
        session.toggle_play_pause();

        let hz = self.config.tick_rate_hz.max(1);
        let dt = 1.0 / f64::from(hz);
        let max_ticks = (self.config.max_duration_secs.max(0.0) * f64::from(hz)) as u64;
        let export_every = self.config.export_every_ticks.max(1);

        let mut ticks = 0u64;
        let mut finished = false;

        while ticks < max_ticks {
            ctx.advance_time(Duration::from_secs_f64(dt));
            ticks += 1;

            let now = ctx.now();
            for command in script.due(now.as_secs_f64()) {
                command.apply(&mut session);
            }
            session.tick(dt, now);

            // Let the analytics task make progress between frames
            tokio::task::yield_now().await;

            if let Some(export) = export.as_deref_mut() {
                if ticks % export_every == 0 {
                    if let Some(frame) = session.current_frame() {
                        export.add_frame(ExportFrame {
                            tick: ticks,
                            time_sec: now.as_secs_f64(),
                            elapsed_millis: session.clock().elapsed_millis(),
                            frame,
                        });
                    }
                }
            }

            if !session.state().is_playing && script.is_finished() {
                finished = true;
                break;
            }

            if ticks % u64::from(hz) == 0 {
                debug!(
                    t = now.as_secs_f64(),
                    index = session.clock().current_index(),
                    path = session.path().len(),
                    "replay progress"
                );
            }
        }

        if !finished {
            warn!(max_secs = self.config.max_duration_secs, "replay hit the time cap");
        }

        self.settle_analytics(&mut session).await;

        let analytics = session.analytics().cloned();
        if let Some(export) = export {
            export.session = session.id().to_string();
            export.finalize(session.state(), session.path_points(), analytics.clone());
        }

        let state = session.state();
        let result = analytics.as_ref().map(|a| &a.result);
        let summary = ReplaySummary {
            session: session.id().to_string(),
            records: state.record_count,
            ticks,
            virtual_secs: ctx.now().as_secs_f64(),
            final_index: state.current_index,
            finished,
            path_points: session.path().len(),
            analytics: analytics.as_ref().map(|a| a.status.clone()),
            loading_zones: result.map_or(0, |r| r.loading_zones.len()),
            unloading_zones: result.map_or(0, |r| r.unloading_zones.len()),
            concrete_operations: result.map_or(0, |r| r.concrete_operations.len()),
        };

        info!(
            ticks = summary.ticks,
            final_index = summary.final_index,
            finished = summary.finished,
            "replay complete"
        );
        summary
    }

    /// Waits for an outstanding classification, bounded by its own timeout.
    async fn settle_analytics(&self, session: &mut ReplaySession) {
        if !session.analytics_pending() {
            return;
        }

        let grace = Duration::from_millis(self.session_config.analytics.timeout_millis)
            + Duration::from_secs(1);
        let wait = async {
            while !session.poll_analytics() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        };

        if tokio::time::timeout(grace, wait).await.is_err() {
            warn!("analytics never reported back");
        }
    }
}

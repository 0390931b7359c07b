//! JSON exporter for replay runs.
//!
//! Captures sampled frames, the final hook trail and the analytics report
//! so a renderer (or a test) can inspect a headless run after the fact.

use crane_core::{AnalyticsReport, FrameView, PathPoint, PlaybackState};
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// One sampled frame.
#[derive(Debug, Clone, Serialize)]
pub struct ExportFrame {
    /// Runner tick that produced the sample
    pub tick: u64,

    /// Virtual wall-clock time in seconds
    pub time_sec: f64,

    /// Simulated playback time in milliseconds
    pub elapsed_millis: f64,

    pub frame: FrameView,
}

/// Complete replay export.
#[derive(Debug, Clone, Serialize)]
pub struct ReplayExport {
    /// Session identifier
    pub session: String,

    /// Where the history came from (file path or "synthetic")
    pub source: String,

    /// Seed of a synthetic history
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    pub record_count: usize,

    /// Duration of the history in milliseconds
    pub duration_millis: f64,

    pub frames: Vec<ExportFrame>,

    pub path: Vec<PathPoint>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub analytics: Option<AnalyticsReport>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_state: Option<PlaybackState>,
}

impl ReplayExport {
    /// Creates a new export container.
    pub fn new(source: &str, seed: Option<u64>) -> Self {
        Self {
            session: String::new(),
            source: source.to_string(),
            seed,
            record_count: 0,
            duration_millis: 0.0,
            frames: Vec::new(),
            path: Vec::new(),
            analytics: None,
            final_state: None,
        }
    }

    pub fn add_frame(&mut self, frame: ExportFrame) {
        self.frames.push(frame);
    }

    /// Records the end-of-run state.
    pub fn finalize(
        &mut self,
        state: PlaybackState,
        path: Vec<PathPoint>,
        analytics: Option<AnalyticsReport>,
    ) {
        self.record_count = state.record_count;
        self.duration_millis = state.total_duration_millis;
        self.final_state = Some(state);
        self.path = path;
        self.analytics = analytics;
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crane_core::{CargoHeuristic, PlaybackClock, Record, RecordSequence};

    #[test]
    fn test_write_to_file() {
        let records = RecordSequence::new(vec![
            Record::new(0, 10.0, 5.0, 0.0),
            Record::new(1_000, 12.0, 5.0, 10.0),
        ])
        .unwrap();
        let clock = PlaybackClock::with_records(records, &mut ());

        let mut export = ReplayExport::new("synthetic", Some(42));
        export.add_frame(ExportFrame {
            tick: 0,
            time_sec: 0.0,
            elapsed_millis: 0.0,
            frame: FrameView::at(clock.records(), 0, &CargoHeuristic::default()).unwrap(),
        });
        export.finalize(clock.state(), Vec::new(), None);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("replay.json");
        export.write_to_file(&path).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["seed"], 42);
        assert_eq!(value["record_count"], 2);
        assert_eq!(value["frames"][0]["frame"]["cargo_type"], "default");
        assert!(value.get("analytics").is_none());
    }
}

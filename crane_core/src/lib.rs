//! Crane Replay Core - Playback and Zone Analytics for Tower Crane Histories
//!
//! This library turns a recorded, irregularly sampled sensor history into:
//! 1. **A seekable timeline**: variable-speed, bidirectional playback over record indices
//! 2. **A hook trail**: bounded, throttled polyline for rendering
//! 3. **Site statistics**: loading/unloading hotspots and concrete pours

pub mod analytics;
pub mod cargo;
pub mod frame;
pub mod path;
pub mod playback;
pub mod record;
pub mod session;
pub mod zones;

// Re-export key types for convenience
pub use analytics::{
    AnalyticsConfig, AnalyticsReport, AnalyticsResult, AnalyticsStatus, CargoAssignment,
    ClassifierRequest, HeuristicClassifier, ZoneAggregator,
};
pub use cargo::CargoHeuristic;
pub use frame::{Direction, FrameView};
pub use path::{PathConfig, PathPoint, PathRecorder};
pub use playback::{PlaybackClock, PlaybackObserver, PlaybackState};
pub use record::{CargoType, Position, Record, RecordError, RecordSequence};
pub use session::{ReplaySession, SessionConfig};
pub use zones::{ClusterConfig, ConcreteOperation, Zone, ZoneKind};

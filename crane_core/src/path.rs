//! Path Recorder - bounded, throttled trail of hook positions.
//!
//! Fed once per rendered frame. Samples closer than `min_distance` to the last
//! accepted point, or arriving sooner than `min_interval_millis` of wall-clock
//! time after it, are dropped. The buffer holds at most `max_points`; the
//! oldest point is evicted first.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

use crate::record::{CargoType, Position};

/// Weight (t) at which the trail reaches full red.
const FULL_LOAD_WEIGHT: f64 = 16.0;

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathConfig {
    /// Minimum distance from the last accepted point (default: 0.5 m)
    pub min_distance: f64,

    /// Minimum wall-clock spacing between accepted points (default: 50 ms)
    pub min_interval_millis: u64,

    /// Ring buffer capacity (default: 5000)
    pub max_points: usize,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            min_distance: 0.5,
            min_interval_millis: 50,
            max_points: 5000,
        }
    }
}

impl PathConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_millis)
    }
}

// ============================================================================
// PATH POINT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PathPoint {
    pub position: Position,
    pub weight: f64,
    /// Timestamp of the record the point was taken from (epoch ms)
    pub time_millis: i64,
    pub cargo_type: CargoType,
}

impl PathPoint {
    /// RGB color for the trail segment ending at this point.
    ///
    /// Concrete is blue; a loaded hook fades yellow → red with weight;
    /// an empty hook is pale blue.
    pub fn color(&self) -> [f64; 3] {
        if self.cargo_type == CargoType::Concrete {
            [0.3, 0.5, 0.85]
        } else if self.weight > 0.0 {
            let intensity = (self.weight / FULL_LOAD_WEIGHT).min(1.0);
            [1.0, 1.0 - intensity, 0.0]
        } else {
            [0.6, 0.8, 1.0]
        }
    }
}

// ============================================================================
// PATH RECORDER
// ============================================================================

#[derive(Debug, Clone)]
pub struct PathRecorder {
    config: PathConfig,
    points: VecDeque<PathPoint>,
    last_accepted_at: Option<Duration>,
}

impl Default for PathRecorder {
    fn default() -> Self {
        Self::new(PathConfig::default())
    }
}

impl PathRecorder {
    pub fn new(config: PathConfig) -> Self {
        Self {
            points: VecDeque::with_capacity(config.max_points.min(1024)),
            config,
            last_accepted_at: None,
        }
    }

    /// Offers a sample taken at wall-clock instant `now`.
    ///
    /// Returns true if the point was appended.
    pub fn record(
        &mut self,
        now: Duration,
        position: Position,
        weight: f64,
        time_millis: i64,
        cargo_type: CargoType,
    ) -> bool {
        if self.config.max_points == 0 {
            return false;
        }

        if let Some(last_at) = self.last_accepted_at {
            if now.saturating_sub(last_at) < self.config.min_interval() {
                return false;
            }
        }

        if let Some(last) = self.points.back() {
            if last.position.distance_to(&position) < self.config.min_distance {
                return false;
            }
        }

        if self.points.len() >= self.config.max_points {
            self.points.pop_front();
        }

        self.points.push_back(PathPoint {
            position,
            weight,
            time_millis,
            cargo_type,
        });
        self.last_accepted_at = Some(now);
        true
    }

    /// Empties the trail and resets the throttle.
    pub fn clear(&mut self) {
        self.points.clear();
        self.last_accepted_at = None;
    }

    /// Points oldest first.
    pub fn points(&self) -> impl Iterator<Item = &PathPoint> {
        self.points.iter()
    }

    pub fn to_vec(&self) -> Vec<PathPoint> {
        self.points.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn config(&self) -> &PathConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn at(x: f64) -> Position {
        Position::new(x, 10.0, 0.0)
    }

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    #[test]
    fn test_first_sample_always_accepted() {
        let mut path = PathRecorder::default();
        assert!(path.record(ms(0), at(0.0), 0.0, 0, CargoType::Default));
        assert_eq!(path.len(), 1);
    }

    #[test]
    fn test_throttled_by_interval() {
        let mut path = PathRecorder::default();
        path.record(ms(0), at(0.0), 0.0, 0, CargoType::Default);

        assert!(!path.record(ms(49), at(5.0), 0.0, 0, CargoType::Default));
        assert!(path.record(ms(50), at(5.0), 0.0, 0, CargoType::Default));
    }

    #[test]
    fn test_throttled_by_distance() {
        let mut path = PathRecorder::default();
        path.record(ms(0), at(0.0), 0.0, 0, CargoType::Default);

        assert!(!path.record(ms(100), at(0.4), 0.0, 0, CargoType::Default));
        assert!(path.record(ms(200), at(0.5), 0.0, 0, CargoType::Default));
    }

    #[test]
    fn test_bounded_with_oldest_evicted() {
        let config = PathConfig {
            max_points: 3,
            ..PathConfig::default()
        };
        let mut path = PathRecorder::new(config);

        for i in 0..5u64 {
            path.record(ms(i * 100), at(i as f64), 0.0, i as i64, CargoType::Default);
        }

        assert_eq!(path.len(), 3);
        let times: Vec<i64> = path.points().map(|p| p.time_millis).collect();
        assert_eq!(times, vec![2, 3, 4]);
    }

    #[test]
    fn test_clear_resets_throttle() {
        let mut path = PathRecorder::default();
        path.record(ms(1_000), at(0.0), 0.0, 0, CargoType::Default);
        path.clear();

        assert!(path.is_empty());
        assert!(path.record(ms(1_001), at(0.0), 0.0, 0, CargoType::Default));
    }

    #[test]
    fn test_color_rules() {
        let point = |weight, cargo_type| PathPoint {
            position: at(0.0),
            weight,
            time_millis: 0,
            cargo_type,
        };

        assert_eq!(point(3.0, CargoType::Concrete).color(), [0.3, 0.5, 0.85]);
        assert_eq!(point(0.0, CargoType::Default).color(), [0.6, 0.8, 1.0]);
        assert_eq!(point(32.0, CargoType::Rebar).color(), [1.0, 0.0, 0.0]);

        let half = point(8.0, CargoType::Default).color();
        assert_relative_eq!(half[1], 0.5);
    }
}

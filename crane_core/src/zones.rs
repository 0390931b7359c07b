//! Zone clustering - where the crane picks up and sets down loads.
//!
//! Works on the classifier's compact point projection so the same code backs
//! the local classifier and any offline analysis of a request.
//!
//! # Pipeline
//!
//! 1. **Events**: a weight step of at least `min_weight_step` between two
//!    consecutive samples, with the hook nearly stationary, is a load
//!    (weight up) or unload (weight down) event.
//! 2. **Zones**: events of one kind are clustered with greedy leader
//!    clustering on horizontal distance. Each cluster keeps a running
//!    centroid; an event joins the first cluster within `cluster_radius`.
//! 3. **Concrete episodes**: runs of samples flagged by the cargo heuristic,
//!    with gaps no longer than `max_episode_gap_millis`.

use crane_env::ClassifierPoint;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cargo::CargoHeuristic;
use crate::record::Position;

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Minimum weight change that counts as a load/unload (default: 0.5 t)
    pub min_weight_step: f64,

    /// Maximum horizontal hook travel during the step (default: 1.5 m)
    pub max_event_travel: f64,

    /// Join radius for zone clusters (default: 5.0 m)
    pub cluster_radius: f64,

    /// Longest pause inside one concrete pour (default: 60 s)
    pub max_episode_gap_millis: i64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            min_weight_step: 0.5,
            max_event_travel: 1.5,
            cluster_radius: 5.0,
            max_episode_gap_millis: 60_000,
        }
    }
}

// ============================================================================
// ZONES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoneKind {
    Loading,
    Unloading,
}

/// A recurring pick-up or set-down location.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Zone {
    pub kind: ZoneKind,
    pub position: Position,
    /// Number of operations observed here (>= 1)
    pub count: u32,
    pub avg_weight: f64,
}

/// A concrete pour: start and end time plus where it happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConcreteOperation {
    /// Epoch milliseconds
    pub start_time: i64,
    /// Epoch milliseconds
    pub end_time: i64,
    pub position: Position,
    pub avg_weight: f64,
}

/// One detected load or unload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadEvent {
    /// Index of the sample after the step
    pub index: usize,
    pub kind: ZoneKind,
    pub position: Position,
    /// The load handled: the heavier side of the step
    pub weight: f64,
}

/// A concrete pour plus the frames it covers.
#[derive(Debug, Clone, PartialEq)]
pub struct ConcreteEpisode {
    pub operation: ConcreteOperation,
    /// Record indices from the first to the last flagged sample
    pub frames: Vec<usize>,
}

fn point_position(point: &ClassifierPoint) -> Position {
    Position::from_polar(point.radius, point.angle, point.height)
}

// ============================================================================
// EVENT DETECTION
// ============================================================================

/// Finds weight steps taken while the hook was (nearly) stationary.
pub fn detect_events(points: &[ClassifierPoint], config: &ClusterConfig) -> Vec<LoadEvent> {
    let mut events = Vec::new();

    for pair in points.windows(2) {
        let (prev, cur) = (&pair[0], &pair[1]);
        let prev_weight = prev.weight.unwrap_or(0.0);
        let weight = cur.weight.unwrap_or(0.0);
        let step = weight - prev_weight;

        if step.abs() < config.min_weight_step {
            continue;
        }

        let position = point_position(cur);
        if point_position(prev).horizontal_distance_to(&position) > config.max_event_travel {
            continue;
        }

        let kind = if step > 0.0 {
            ZoneKind::Loading
        } else {
            ZoneKind::Unloading
        };

        events.push(LoadEvent {
            index: cur.index,
            kind,
            position,
            weight: prev_weight.max(weight),
        });
    }

    events
}

// ============================================================================
// LEADER CLUSTERING
// ============================================================================

struct Cluster {
    centroid: Vector3<f64>,
    weight_sum: f64,
    count: u32,
}

/// Clusters events of `kind` into zones, most frequent first.
///
/// Zones with equal counts keep the order in which they were first seen.
pub fn cluster_events(events: &[LoadEvent], kind: ZoneKind, radius: f64) -> Vec<Zone> {
    let mut clusters: Vec<Cluster> = Vec::new();

    for event in events.iter().filter(|e| e.kind == kind) {
        let v = event.position.to_vector();
        let nearest = clusters.iter_mut().find(|c| {
            Position::from_vector(c.centroid).horizontal_distance_to(&event.position) <= radius
        });

        match nearest {
            Some(cluster) => {
                cluster.count += 1;
                cluster.centroid += (v - cluster.centroid) / f64::from(cluster.count);
                cluster.weight_sum += event.weight;
            }
            None => clusters.push(Cluster {
                centroid: v,
                weight_sum: event.weight,
                count: 1,
            }),
        }
    }

    let mut zones: Vec<Zone> = clusters
        .into_iter()
        .map(|c| Zone {
            kind,
            position: Position::from_vector(c.centroid),
            count: c.count,
            avg_weight: c.weight_sum / f64::from(c.count),
        })
        .collect();

    sort_zones(&mut zones);
    zones
}

/// Descending by count, stable.
pub fn sort_zones(zones: &mut [Zone]) {
    zones.sort_by(|a, b| b.count.cmp(&a.count));
}

// ============================================================================
// CONCRETE EPISODES
// ============================================================================

/// Groups heuristic-flagged samples into pours.
pub fn detect_concrete_episodes(
    points: &[ClassifierPoint],
    heuristic: &CargoHeuristic,
    config: &ClusterConfig,
) -> Vec<ConcreteEpisode> {
    // (position in `points`, bucket weight before the drop)
    let mut runs: Vec<Vec<(usize, f64)>> = Vec::new();
    let mut last_time: Option<i64> = None;

    for (i, pair) in points.windows(2).enumerate() {
        let (prev, cur) = (&pair[0], &pair[1]);
        if !heuristic.is_concrete_drop(prev.weight, cur.weight, cur.reeving) {
            continue;
        }

        let bucket = prev.weight.unwrap_or(0.0);
        let continues = last_time.is_some_and(|t| cur.time - t <= config.max_episode_gap_millis);
        match runs.last_mut() {
            Some(run) if continues => run.push((i + 1, bucket)),
            _ => runs.push(vec![(i + 1, bucket)]),
        }
        last_time = Some(cur.time);
    }

    let episodes: Vec<ConcreteEpisode> = runs
        .into_iter()
        .filter_map(|run| episode_from_run(points, &run))
        .collect();

    debug!(episodes = episodes.len(), "concrete episodes detected");
    episodes
}

fn episode_from_run(points: &[ClassifierPoint], run: &[(usize, f64)]) -> Option<ConcreteEpisode> {
    let &(first, _) = run.first()?;
    let &(last, _) = run.last()?;
    let n = run.len() as f64;

    let centroid = run
        .iter()
        .map(|&(i, _)| point_position(&points[i]).to_vector())
        .fold(Vector3::zeros(), |acc, v| acc + v)
        / n;
    let avg_weight = run.iter().map(|&(_, w)| w).sum::<f64>() / n;

    Some(ConcreteEpisode {
        operation: ConcreteOperation {
            start_time: points[first].time,
            end_time: points[last].time,
            position: Position::from_vector(centroid),
            avg_weight,
        },
        frames: points[first..=last].iter().map(|p| p.index).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn point(index: usize, radius: f64, angle: f64, weight: f64, reeving: u32) -> ClassifierPoint {
        ClassifierPoint {
            index,
            time: 1_700_000_000_000 + index as i64 * 1_000,
            radius,
            angle,
            height: 10.0,
            weight: Some(weight),
            wind: None,
            reeving,
        }
    }

    /// Hook picks up at angle 0 and sets down at angle 90, `cycles` times.
    fn shuttle(cycles: usize) -> Vec<ClassifierPoint> {
        let mut points = Vec::new();
        for _ in 0..cycles {
            let i = points.len();
            points.push(point(i, 20.0, 0.0, 0.0, 1));
            points.push(point(i + 1, 20.0, 0.0, 3.0, 1));
            points.push(point(i + 2, 20.0, 45.0, 3.0, 1));
            points.push(point(i + 3, 20.0, 90.0, 3.0, 1));
            points.push(point(i + 4, 20.0, 90.0, 0.0, 1));
        }
        points
    }

    #[test]
    fn test_detect_events_kinds() {
        let events = detect_events(&shuttle(1), &ClusterConfig::default());
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, ZoneKind::Loading);
        assert_eq!(events[0].index, 1);
        assert_eq!(events[1].kind, ZoneKind::Unloading);
        assert_relative_eq!(events[1].weight, 3.0);
    }

    #[test]
    fn test_moving_hook_is_not_an_event() {
        let points = vec![point(0, 20.0, 0.0, 0.0, 1), point(1, 20.0, 30.0, 3.0, 1)];
        assert!(detect_events(&points, &ClusterConfig::default()).is_empty());
    }

    #[test]
    fn test_cluster_counts_repeated_stops() {
        let config = ClusterConfig::default();
        let events = detect_events(&shuttle(4), &config);

        let loading = cluster_events(&events, ZoneKind::Loading, config.cluster_radius);
        assert_eq!(loading.len(), 1);
        assert_eq!(loading[0].count, 4);
        assert_relative_eq!(loading[0].position.x, 20.0, epsilon = 1e-9);
        assert_relative_eq!(loading[0].avg_weight, 3.0);

        let unloading = cluster_events(&events, ZoneKind::Unloading, config.cluster_radius);
        assert_eq!(unloading.len(), 1);
        assert_relative_eq!(unloading[0].position.z, 20.0, epsilon = 1e-9);
    }

    #[test]
    fn test_zones_sorted_by_count_stably() {
        let at = |x: f64| LoadEvent {
            index: 0,
            kind: ZoneKind::Loading,
            position: Position::new(x, 0.0, 0.0),
            weight: 1.0,
        };
        // Zone at 0 seen once, zone at 100 twice, zone at 200 once
        let events = vec![at(0.0), at(100.0), at(100.0), at(200.0)];
        let zones = cluster_events(&events, ZoneKind::Loading, 5.0);

        let xs: Vec<f64> = zones.iter().map(|z| z.position.x).collect();
        assert_eq!(xs, vec![100.0, 0.0, 200.0]);
    }

    #[test]
    fn test_concrete_episode_split_by_gap() {
        let mut points = vec![
            point(0, 15.0, 10.0, 2.5, 2),
            point(1, 15.0, 10.0, 2.0, 2),
            point(2, 15.0, 10.0, 1.5, 2),
            point(3, 15.0, 10.0, 1.0, 2),
            point(4, 15.0, 10.0, 2.5, 2),
            point(5, 15.0, 10.0, 2.0, 2),
        ];
        // Second pour starts two minutes later
        points[4].time += 120_000;
        points[5].time += 120_000;

        let episodes =
            detect_concrete_episodes(&points, &CargoHeuristic::default(), &ClusterConfig::default());

        assert_eq!(episodes.len(), 2);
        assert_eq!(episodes[0].frames, vec![1, 2, 3]);
        assert_eq!(episodes[0].operation.start_time, points[1].time);
        assert_eq!(episodes[0].operation.end_time, points[3].time);
        assert_relative_eq!(episodes[0].operation.avg_weight, 2.0);
        assert_eq!(episodes[1].frames, vec![5]);
    }

    #[test]
    fn test_single_branch_drops_are_not_concrete() {
        let points = vec![point(0, 15.0, 0.0, 3.0, 1), point(1, 15.0, 0.0, 0.0, 1)];
        let episodes =
            detect_concrete_episodes(&points, &CargoHeuristic::default(), &ClusterConfig::default());
        assert!(episodes.is_empty());
    }

    #[test]
    fn test_operation_wire_format() {
        let op = ConcreteOperation {
            start_time: 1,
            end_time: 2,
            position: Position::default(),
            avg_weight: 1.5,
        };
        let value = serde_json::to_value(&op).unwrap();
        assert_eq!(value["startTime"], 1);
        assert_eq!(value["avgWeight"], 1.5);
    }
}

//! Zone Aggregator - asks a classifier about the history and cleans up the answer.
//!
//! The classifier is an untrusted collaborator: it may be slow, fail, or
//! return a document that only loosely matches the expected shape. The
//! aggregator absorbs all of that. Its output is always a well-formed
//! `AnalyticsResult`, and failures are reported through `AnalyticsStatus`
//! rather than as errors.

use async_trait::async_trait;
use crane_env::{ClassifierPoint, EnvError, ZoneClassifier};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::cargo::CargoHeuristic;
use crate::record::{CargoType, Position, RecordSequence};
use crate::zones::{
    cluster_events, detect_concrete_episodes, detect_events, sort_zones, ClusterConfig,
    ConcreteOperation, Zone, ZoneKind,
};

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    /// Histories shorter than this are not analysed (default: 50)
    pub min_records: usize,

    /// Request size cap; later records are not sent (default: 1000)
    pub max_points: usize,

    /// Classifier deadline (default: 30 s)
    pub timeout_millis: u64,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            min_records: 50,
            max_points: 1000,
            timeout_millis: 30_000,
        }
    }
}

// ============================================================================
// REQUEST / RESULT TYPES
// ============================================================================

/// Snapshot of the history taken at request time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassifierRequest {
    pub points: Vec<ClassifierPoint>,
    /// Length of the history the request was cut from
    pub total_records: usize,
}

impl ClassifierRequest {
    pub fn is_truncated(&self) -> bool {
        self.points.len() < self.total_records
    }
}

/// Per-frame cargo verdict. `None` means "explicitly unknown".
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CargoAssignment {
    #[serde(rename = "frameIdx")]
    pub frame_index: usize,
    #[serde(rename = "type")]
    pub cargo_type: Option<CargoType>,
}

/// Normalized classifier output. Serializes to the classifier wire format.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsResult {
    pub loading_zones: Vec<Zone>,
    pub unloading_zones: Vec<Zone>,
    pub cargo_types: Vec<CargoAssignment>,
    pub concrete_operations: Vec<ConcreteOperation>,
}

impl AnalyticsResult {
    pub fn is_empty(&self) -> bool {
        self.loading_zones.is_empty()
            && self.unloading_zones.is_empty()
            && self.cargo_types.is_empty()
            && self.concrete_operations.is_empty()
    }

    /// Cargo verdicts keyed by record index; the last verdict for a frame wins.
    pub fn cargo_map(&self) -> HashMap<usize, Option<CargoType>> {
        self.cargo_types
            .iter()
            .map(|a| (a.frame_index, a.cargo_type))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalyticsStatus {
    Completed,
    /// History too short to analyse
    Skipped,
    /// Classifier error or timeout; the result is empty
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyticsReport {
    pub status: AnalyticsStatus,
    pub result: AnalyticsResult,
    pub classifier: String,
    pub points_sent: usize,
}

impl AnalyticsReport {
    fn empty(status: AnalyticsStatus, classifier: &str, points_sent: usize) -> Self {
        Self {
            status,
            result: AnalyticsResult::default(),
            classifier: classifier.to_string(),
            points_sent,
        }
    }

    pub fn skipped() -> Self {
        Self::empty(AnalyticsStatus::Skipped, "", 0)
    }

    pub fn is_completed(&self) -> bool {
        self.status == AnalyticsStatus::Completed
    }
}

// ============================================================================
// ZONE AGGREGATOR
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct ZoneAggregator {
    config: AnalyticsConfig,
}

impl ZoneAggregator {
    pub fn new(config: AnalyticsConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AnalyticsConfig {
        &self.config
    }

    /// Projects the history into a classifier request.
    ///
    /// Returns `None` for histories shorter than `min_records`.
    pub fn prepare(&self, records: &RecordSequence) -> Option<ClassifierRequest> {
        if records.len() < self.config.min_records || records.is_empty() {
            debug!(
                records = records.len(),
                min = self.config.min_records,
                "history too short, skipping analytics"
            );
            return None;
        }

        if records.len() > self.config.max_points {
            warn!(
                records = records.len(),
                max_points = self.config.max_points,
                "history too long, classifying only the first {} records",
                self.config.max_points
            );
        }

        let points = records
            .iter()
            .take(self.config.max_points)
            .enumerate()
            .map(|(index, r)| ClassifierPoint {
                index,
                time: r.timestamp_millis,
                radius: r.radius,
                angle: r.angle,
                height: r.height,
                weight: r.weight,
                wind: r.wind,
                reeving: r.reeving,
            })
            .collect();

        Some(ClassifierRequest {
            points,
            total_records: records.len(),
        })
    }

    /// Runs the classifier under the configured deadline. Never fails.
    pub async fn execute(
        &self,
        request: &ClassifierRequest,
        classifier: &dyn ZoneClassifier,
    ) -> AnalyticsReport {
        let name = classifier.name();
        let sent = request.points.len();
        let deadline = Duration::from_millis(self.config.timeout_millis);

        let raw = match tokio::time::timeout(deadline, classifier.classify(&request.points)).await
        {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => {
                warn!(classifier = name, error = %e, "classification failed");
                return AnalyticsReport::empty(AnalyticsStatus::Failed(e.to_string()), name, sent);
            }
            Err(_) => {
                let e = EnvError::Timeout(self.config.timeout_millis);
                warn!(classifier = name, error = %e, "classification timed out");
                return AnalyticsReport::empty(AnalyticsStatus::Failed(e.to_string()), name, sent);
            }
        };

        if !raw.is_object() {
            let e = EnvError::malformed("response is not a JSON object");
            warn!(classifier = name, error = %e, "classification unusable");
            return AnalyticsReport::empty(AnalyticsStatus::Failed(e.to_string()), name, sent);
        }

        let result = normalize(&raw);
        info!(
            classifier = name,
            loading = result.loading_zones.len(),
            unloading = result.unloading_zones.len(),
            cargo = result.cargo_types.len(),
            concrete = result.concrete_operations.len(),
            "analytics completed"
        );

        AnalyticsReport {
            status: AnalyticsStatus::Completed,
            result,
            classifier: name.to_string(),
            points_sent: sent,
        }
    }

    /// `prepare` followed by `execute`.
    pub async fn run(
        &self,
        records: &RecordSequence,
        classifier: &dyn ZoneClassifier,
    ) -> AnalyticsReport {
        match self.prepare(records) {
            Some(request) => self.execute(&request, classifier).await,
            None => AnalyticsReport::skipped(),
        }
    }
}

// ============================================================================
// NORMALIZATION
// ============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireZone {
    position: Position,
    count: f64,
    #[serde(default)]
    avg_weight: Option<f64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireCargo {
    frame_idx: usize,
    #[serde(rename = "type", default)]
    label: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireConcreteOperation {
    start_time: Value,
    end_time: Value,
    position: Position,
    #[serde(default)]
    avg_weight: Option<f64>,
}

/// Shapes a raw classifier document into an `AnalyticsResult`.
///
/// Missing or non-array fields become empty; elements that do not parse are
/// skipped one by one; zero-count zones are dropped; zones are sorted by
/// count, descending.
pub fn normalize(raw: &Value) -> AnalyticsResult {
    let loading_zones = zones_from(raw, "loadingZones", ZoneKind::Loading);
    let unloading_zones = zones_from(raw, "unloadingZones", ZoneKind::Unloading);

    let cargo_types = elements::<WireCargo>(raw, "cargoTypes")
        .into_iter()
        .map(|c| CargoAssignment {
            frame_index: c.frame_idx,
            cargo_type: c.label.as_deref().map(CargoType::from_label),
        })
        .collect();

    let concrete_operations = elements::<WireConcreteOperation>(raw, "concreteOperations")
        .into_iter()
        .filter_map(|op| {
            Some(ConcreteOperation {
                start_time: epoch_millis(&op.start_time)?,
                end_time: epoch_millis(&op.end_time)?,
                position: op.position,
                avg_weight: op.avg_weight.unwrap_or(0.0),
            })
        })
        .collect();

    AnalyticsResult {
        loading_zones,
        unloading_zones,
        cargo_types,
        concrete_operations,
    }
}

fn zones_from(raw: &Value, key: &str, kind: ZoneKind) -> Vec<Zone> {
    let mut zones: Vec<Zone> = elements::<WireZone>(raw, key)
        .into_iter()
        .filter(|z| z.count.is_finite() && z.count.round() >= 1.0)
        .map(|z| Zone {
            kind,
            position: z.position,
            count: z.count.round().min(f64::from(u32::MAX)) as u32,
            avg_weight: z.avg_weight.unwrap_or(0.0),
        })
        .collect();
    sort_zones(&mut zones);
    zones
}

fn elements<T: DeserializeOwned>(raw: &Value, key: &str) -> Vec<T> {
    let Some(items) = raw.get(key).and_then(Value::as_array) else {
        if raw.get(key).is_some_and(|v| !v.is_null()) {
            debug!(field = key, "ignoring non-array field");
        }
        return Vec::new();
    };

    let parsed: Vec<T> = items
        .iter()
        .filter_map(|item| T::deserialize(item).ok())
        .collect();

    if parsed.len() < items.len() {
        debug!(
            field = key,
            skipped = items.len() - parsed.len(),
            "skipped malformed elements"
        );
    }
    parsed
}

/// Accepts epoch milliseconds as an integer, a float or a numeric string.
fn epoch_millis(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.round() as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

// ============================================================================
// LOCAL CLASSIFIER
// ============================================================================

/// Deterministic, offline implementation of the classifier contract.
///
/// Zones come from leader clustering of weight steps; cargo types mark the
/// frames of each detected concrete pour.
#[derive(Debug, Clone, Default)]
pub struct HeuristicClassifier {
    pub cluster: ClusterConfig,
    pub heuristic: CargoHeuristic,
}

impl HeuristicClassifier {
    pub fn new(cluster: ClusterConfig, heuristic: CargoHeuristic) -> Self {
        Self { cluster, heuristic }
    }

    /// Classification without the async wrapper.
    pub fn analyse(&self, points: &[ClassifierPoint]) -> AnalyticsResult {
        let events = detect_events(points, &self.cluster);
        let episodes = detect_concrete_episodes(points, &self.heuristic, &self.cluster);

        let cargo_types = episodes
            .iter()
            .flat_map(|e| e.frames.iter())
            .map(|&frame_index| CargoAssignment {
                frame_index,
                cargo_type: Some(CargoType::Concrete),
            })
            .collect();

        AnalyticsResult {
            loading_zones: cluster_events(&events, ZoneKind::Loading, self.cluster.cluster_radius),
            unloading_zones: cluster_events(
                &events,
                ZoneKind::Unloading,
                self.cluster.cluster_radius,
            ),
            cargo_types,
            concrete_operations: episodes.into_iter().map(|e| e.operation).collect(),
        }
    }
}

#[async_trait]
impl ZoneClassifier for HeuristicClassifier {
    fn name(&self) -> &str {
        "heuristic"
    }

    async fn classify(&self, points: &[ClassifierPoint]) -> Result<Value, EnvError> {
        Ok(serde_json::to_value(self.analyse(points))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;
    use crane_env::CannedClassifier;
    use serde_json::json;

    fn history(n: usize) -> RecordSequence {
        RecordSequence::new(
            (0..n)
                .map(|i| Record::new(i as i64 * 1_000, 20.0, 10.0, 0.0))
                .collect(),
        )
        .unwrap()
    }

    /// Repeated pick-ups at angle 0, set-downs at 90, then a concrete pour.
    fn working_day() -> RecordSequence {
        let mut records = Vec::new();
        let mut push = |angle: f64, weight: f64, reeving: i64| {
            let t = records.len() as i64 * 1_000;
            records.push(
                Record::new(t, 25.0, 12.0, angle)
                    .with_weight(weight)
                    .with_reeving(reeving),
            );
        };

        for _ in 0..12 {
            push(0.0, 0.0, 1);
            push(0.0, 2.0, 1);
            push(45.0, 2.0, 1);
            push(90.0, 2.0, 1);
            push(90.0, 0.0, 1);
        }
        push(180.0, 3.0, 2);
        push(180.0, 2.5, 2);
        push(180.0, 2.0, 2);
        push(180.0, 1.5, 2);

        RecordSequence::new(records).unwrap()
    }

    struct SlowClassifier;

    #[async_trait]
    impl ZoneClassifier for SlowClassifier {
        fn name(&self) -> &str {
            "slow"
        }

        async fn classify(&self, _points: &[ClassifierPoint]) -> Result<Value, EnvError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(json!({}))
        }
    }

    #[test]
    fn test_normalize_tolerates_bad_fields() {
        // Scenario C
        let raw = json!({
            "loadingZones": [],
            "unloadingZones": [],
            "cargoTypes": "not-an-array",
            "concreteOperations": null
        });
        let result = normalize(&raw);
        assert!(result.is_empty());
    }

    #[test]
    fn test_normalize_sorts_zones_by_count() {
        let raw = json!({
            "loadingZones": [
                {"position": {"x": 1.0, "y": 0.0, "z": 0.0}, "count": 2, "avgWeight": 1.0},
                {"position": {"x": 2.0, "y": 0.0, "z": 0.0}, "count": 7, "avgWeight": 1.0},
                {"position": {"x": 3.0, "y": 0.0, "z": 0.0}, "count": 2, "avgWeight": 1.0}
            ]
        });
        let zones = normalize(&raw).loading_zones;
        let counts: Vec<u32> = zones.iter().map(|z| z.count).collect();
        assert_eq!(counts, vec![7, 2, 2]);
        assert_eq!(zones[1].position.x, 1.0);
        assert_eq!(zones[2].position.x, 3.0);
    }

    #[test]
    fn test_normalize_skips_bad_elements() {
        let raw = json!({
            "unloadingZones": [
                {"position": {"x": 1.0, "y": 0.0, "z": 0.0}, "count": 0},
                {"position": "nowhere", "count": 3},
                {"position": {"x": 5.0, "y": 1.0, "z": 2.0}, "count": 4}
            ],
            "cargoTypes": [
                {"frameIdx": 3, "type": "concrete"},
                {"frameIdx": 4, "type": "crates"},
                {"frameIdx": 5, "type": null},
                {"type": "rebar"}
            ],
            "concreteOperations": [
                {"startTime": "1700000000000", "endTime": 1_700_000_060_000i64,
                 "position": {"x": 0.0, "y": 0.0, "z": 0.0}, "avgWeight": 2.0},
                {"startTime": "noon", "endTime": 1,
                 "position": {"x": 0.0, "y": 0.0, "z": 0.0}}
            ]
        });
        let result = normalize(&raw);

        assert_eq!(result.unloading_zones.len(), 1);
        assert_eq!(result.unloading_zones[0].count, 4);
        assert_eq!(result.unloading_zones[0].avg_weight, 0.0);

        let cargo = result.cargo_map();
        assert_eq!(cargo.len(), 3);
        assert_eq!(cargo[&3], Some(CargoType::Concrete));
        assert_eq!(cargo[&4], Some(CargoType::Default));
        assert_eq!(cargo[&5], None);

        assert_eq!(result.concrete_operations.len(), 1);
        assert_eq!(result.concrete_operations[0].start_time, 1_700_000_000_000);
    }

    #[test]
    fn test_prepare_skips_short_history() {
        let aggregator = ZoneAggregator::default();
        assert!(aggregator.prepare(&history(49)).is_none());
        assert!(aggregator.prepare(&RecordSequence::empty()).is_none());
        assert_eq!(aggregator.prepare(&history(50)).unwrap().points.len(), 50);
    }

    #[test]
    fn test_prepare_truncates_long_history() {
        let aggregator = ZoneAggregator::new(AnalyticsConfig {
            max_points: 60,
            ..AnalyticsConfig::default()
        });
        let request = aggregator.prepare(&history(100)).unwrap();

        assert_eq!(request.points.len(), 60);
        assert!(request.is_truncated());
        assert_eq!(request.points[59].index, 59);
        assert_eq!(request.points[59].time, 59_000);
    }

    #[tokio::test]
    async fn test_run_skipped() {
        let report = ZoneAggregator::default()
            .run(&history(3), &HeuristicClassifier::default())
            .await;
        assert_eq!(report.status, AnalyticsStatus::Skipped);
        assert!(report.result.is_empty());
    }

    #[tokio::test]
    async fn test_classifier_failure_is_empty_result() {
        let report = ZoneAggregator::default()
            .run(&history(60), &CannedClassifier::failing("offline"))
            .await;
        assert!(matches!(report.status, AnalyticsStatus::Failed(_)));
        assert!(report.result.is_empty());
        assert_eq!(report.points_sent, 60);
    }

    #[tokio::test]
    async fn test_non_object_response_fails() {
        let report = ZoneAggregator::default()
            .run(&history(60), &CannedClassifier::new(json!([1, 2, 3])))
            .await;
        assert!(matches!(report.status, AnalyticsStatus::Failed(_)));
    }

    #[tokio::test]
    async fn test_timeout_is_failure() {
        let aggregator = ZoneAggregator::new(AnalyticsConfig {
            timeout_millis: 20,
            ..AnalyticsConfig::default()
        });
        let report = aggregator.run(&history(60), &SlowClassifier).await;

        match report.status {
            AnalyticsStatus::Failed(reason) => assert!(reason.contains("20")),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_heuristic_classifier_round_trip() {
        let records = working_day();
        let report = ZoneAggregator::default()
            .run(&records, &HeuristicClassifier::default())
            .await;

        assert!(report.is_completed());
        let result = report.result;

        assert_eq!(result.loading_zones.len(), 1);
        assert_eq!(result.loading_zones[0].count, 12);
        assert_eq!(result.unloading_zones[0].count, 12);

        assert_eq!(result.concrete_operations.len(), 1);
        let concrete: Vec<usize> = result.cargo_types.iter().map(|c| c.frame_index).collect();
        assert_eq!(concrete, vec![61, 62, 63]);
    }
}

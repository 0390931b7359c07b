//! Zone classifier abstraction.
//!
//! The classifier is the one external service the replay core talks to
//! asynchronously. It receives a compact projection of the recorded history
//! and answers with a loosely structured JSON document; shaping that document
//! into zones is the aggregator's job, not the classifier's.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::EnvError;

/// One history sample as sent to a classifier.
///
/// ```text
/// {index, time, radius, angle, height, weight, wind, reeving}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierPoint {
    /// Position of the sample in the full record sequence
    pub index: usize,

    /// Absolute timestamp (epoch milliseconds)
    pub time: i64,

    /// Trolley radius in meters
    pub radius: f64,

    /// Slewing angle in degrees
    pub angle: f64,

    /// Hook height in meters
    pub height: f64,

    /// Load weight in tonnes
    pub weight: Option<f64>,

    /// Wind speed in m/s
    pub wind: Option<f64>,

    /// Rope branch count (always >= 1)
    pub reeving: u32,
}

/// Abstraction for zone classification services.
///
/// # Implementations
///
/// - **Local**: `HeuristicClassifier` (in `crane_core`) - clustering over weight steps
/// - **Canned**: `CannedClassifier` - replays a stored response
/// - **Remote**: anything that can turn points into the response document
///
/// # Response shape
///
/// ```text
/// {
///   loadingZones:       [{position:{x,y,z}, count, avgWeight}],
///   unloadingZones:     [{position:{x,y,z}, count, avgWeight}],
///   cargoTypes:         [{frameIdx, type}],
///   concreteOperations: [{startTime, endTime, position:{x,y,z}, avgWeight}]
/// }
/// ```
///
/// Implementations are not required to get the shape right; missing or
/// malformed fields are tolerated downstream.
#[async_trait]
pub trait ZoneClassifier: Send + Sync + 'static {
    /// Human-readable classifier name (for logs).
    fn name(&self) -> &str;

    /// Classifies the given points.
    ///
    /// # Returns
    /// * `Ok(value)` - Raw response document
    /// * `Err(EnvError)` - The service failed; callers treat this as "no analytics"
    async fn classify(&self, points: &[ClassifierPoint]) -> Result<Value, EnvError>;
}

/// Classifier that answers every request with a stored response.
///
/// Used to replay a response captured from a remote service, and in tests
/// to inject malformed or failing answers.
#[derive(Debug, Clone)]
pub struct CannedClassifier {
    response: Result<Value, String>,
}

impl CannedClassifier {
    /// Creates a classifier that always returns `response`.
    pub fn new(response: Value) -> Self {
        Self {
            response: Ok(response),
        }
    }

    /// Parses a stored response document.
    pub fn from_json(text: &str) -> Result<Self, EnvError> {
        Ok(Self::new(serde_json::from_str(text)?))
    }

    /// Creates a classifier that always fails with `reason`.
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            response: Err(reason.into()),
        }
    }
}

#[async_trait]
impl ZoneClassifier for CannedClassifier {
    fn name(&self) -> &str {
        "canned"
    }

    async fn classify(&self, _points: &[ClassifierPoint]) -> Result<Value, EnvError> {
        match &self.response {
            Ok(value) => Ok(value.clone()),
            Err(reason) => Err(EnvError::classifier(reason.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_point() -> ClassifierPoint {
        ClassifierPoint {
            index: 3,
            time: 1_700_000_000_000,
            radius: 20.0,
            angle: 90.0,
            height: 12.5,
            weight: Some(1.8),
            wind: None,
            reeving: 2,
        }
    }

    #[test]
    fn test_point_wire_format() {
        let value = serde_json::to_value(sample_point()).unwrap();
        assert_eq!(value["index"], 3);
        assert_eq!(value["reeving"], 2);
        assert!(value["wind"].is_null());
    }

    #[tokio::test]
    async fn test_canned_classifier_returns_response() {
        let classifier = CannedClassifier::new(json!({"loadingZones": []}));
        let value = classifier.classify(&[sample_point()]).await.unwrap();
        assert!(value["loadingZones"].is_array());
    }

    #[tokio::test]
    async fn test_canned_classifier_failure() {
        let classifier = CannedClassifier::failing("service offline");
        let err = classifier.classify(&[]).await.unwrap_err();
        assert!(matches!(err, EnvError::ClassifierFailed(_)));
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        let err = CannedClassifier::from_json("not json").unwrap_err();
        assert!(matches!(err, EnvError::MalformedResponse(_)));
    }
}

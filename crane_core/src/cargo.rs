//! Concrete-discharge heuristic shared by the frame view and the local classifier.
//!
//! A concrete bucket is hoisted on a multi-branch reeving and loses weight in
//! abrupt steps while it discharges. Whenever no classifier verdict exists
//! for a frame, this is the rule that decides between `Concrete` and
//! `Default`.

use serde::{Deserialize, Serialize};

use crate::record::{CargoType, Record};

/// Thresholds for the concrete-drop rule.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CargoHeuristic {
    /// Minimum weight loss versus the previous sample (default: 0.4 t)
    pub weight_drop_threshold: f64,

    /// Minimum rope branch count (default: 2)
    pub min_reeving: u32,
}

impl Default for CargoHeuristic {
    fn default() -> Self {
        Self {
            weight_drop_threshold: 0.4,
            min_reeving: 2,
        }
    }
}

impl CargoHeuristic {
    /// True when the sample looks like a bucket mid-discharge.
    ///
    /// Both weights must be present; the drop must be strictly greater than
    /// the threshold.
    pub fn is_concrete_drop(
        &self,
        previous_weight: Option<f64>,
        weight: Option<f64>,
        reeving: u32,
    ) -> bool {
        if reeving < self.min_reeving {
            return false;
        }
        match (previous_weight, weight) {
            (Some(prev), Some(current)) => prev - current > self.weight_drop_threshold,
            _ => false,
        }
    }

    /// Classifies a record against its predecessor.
    pub fn classify(&self, previous: Option<&Record>, current: &Record) -> CargoType {
        let prev_weight = previous.and_then(|p| p.weight);
        if self.is_concrete_drop(prev_weight, current.weight, current.reeving) {
            CargoType::Concrete
        } else {
            CargoType::Default
        }
    }

    /// The cargo type a renderer should show: the annotated type if the
    /// analytics merge produced one, otherwise the heuristic.
    pub fn resolve(&self, previous: Option<&Record>, current: &Record) -> CargoType {
        current
            .cargo_type
            .unwrap_or_else(|| self.classify(previous, current))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(weight: f64, reeving: i64) -> Record {
        Record::new(0, 10.0, 5.0, 0.0)
            .with_weight(weight)
            .with_reeving(reeving)
    }

    #[test]
    fn test_concrete_drop_detected() {
        let h = CargoHeuristic::default();
        let prev = sample(2.0, 2);
        let cur = sample(1.5, 2);
        assert_eq!(h.classify(Some(&prev), &cur), CargoType::Concrete);
    }

    #[test]
    fn test_drop_at_threshold_is_not_concrete() {
        let h = CargoHeuristic {
            weight_drop_threshold: 0.5,
            min_reeving: 2,
        };
        assert!(!h.is_concrete_drop(Some(2.0), Some(1.5), 2));
    }

    #[test]
    fn test_single_branch_never_concrete() {
        let h = CargoHeuristic::default();
        assert!(!h.is_concrete_drop(Some(5.0), Some(1.0), 1));
    }

    #[test]
    fn test_missing_weights_never_concrete() {
        let h = CargoHeuristic::default();
        assert!(!h.is_concrete_drop(None, Some(1.0), 4));
        assert!(!h.is_concrete_drop(Some(3.0), None, 4));
        assert_eq!(h.classify(None, &sample(1.0, 4)), CargoType::Default);
    }

    #[test]
    fn test_resolve_prefers_annotation() {
        let h = CargoHeuristic::default();
        let prev = sample(2.0, 2);
        let mut cur = sample(1.0, 2);
        cur.cargo_type = Some(CargoType::Rebar);
        assert_eq!(h.resolve(Some(&prev), &cur), CargoType::Rebar);
    }
}

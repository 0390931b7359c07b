//! Recorded crane history: samples, hook positions and the ordered sequence.
//!
//! A `RecordSequence` is built once per session and frozen afterwards. The
//! only mutation it allows is the cargo-type annotation pass that follows a
//! completed classification, and that pass is crate-private so it can only
//! happen through the playback clock.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// CARGO TYPE
// ============================================================================

/// What is hanging on the hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CargoType {
    Concrete,
    Rebar,
    Panel,
    Default,
}

impl CargoType {
    /// Maps a free-form classifier label to a cargo type.
    ///
    /// Unknown labels fall back to `Default` so a renderer always has
    /// something to draw.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "concrete" => CargoType::Concrete,
            "rebar" => CargoType::Rebar,
            "panel" => CargoType::Panel,
            _ => CargoType::Default,
        }
    }

    /// Returns the wire name.
    pub fn name(&self) -> &'static str {
        match self {
            CargoType::Concrete => "concrete",
            CargoType::Rebar => "rebar",
            CargoType::Panel => "panel",
            CargoType::Default => "default",
        }
    }
}

impl std::fmt::Display for CargoType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ============================================================================
// POSITION
// ============================================================================

/// Hook position in the crane's local frame (meters).
///
/// `y` is up; the slewing plane is `x`/`z`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Converts trolley radius, slewing angle (degrees) and hook height
    /// into a cartesian position.
    ///
    /// `x = r·cos(θ)`, `y = h`, `z = r·sin(θ)`
    pub fn from_polar(radius: f64, angle_degrees: f64, height: f64) -> Self {
        let theta = angle_degrees.to_radians();
        Self {
            x: radius * theta.cos(),
            y: height,
            z: radius * theta.sin(),
        }
    }

    #[inline]
    pub fn to_vector(self) -> Vector3<f64> {
        Vector3::new(self.x, self.y, self.z)
    }

    #[inline]
    pub fn from_vector(v: Vector3<f64>) -> Self {
        Self::new(v.x, v.y, v.z)
    }

    /// Euclidean distance in 3D.
    pub fn distance_to(&self, other: &Position) -> f64 {
        (self.to_vector() - other.to_vector()).norm()
    }

    /// Distance in the slewing plane, ignoring hook height.
    pub fn horizontal_distance_to(&self, other: &Position) -> f64 {
        let dx = self.x - other.x;
        let dz = self.z - other.z;
        (dx * dx + dz * dz).sqrt()
    }
}

// ============================================================================
// RECORD
// ============================================================================

/// One time-stamped sensor sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Absolute time (epoch milliseconds)
    pub timestamp_millis: i64,

    /// Milliseconds since the first record of the sequence
    pub relative_millis: i64,

    /// Trolley radius (m)
    pub radius: f64,

    /// Hook height (m)
    pub height: f64,

    /// Slewing angle (degrees)
    pub angle: f64,

    /// Load weight (t)
    pub weight: Option<f64>,

    /// Wind speed (m/s)
    pub wind: Option<f64>,

    /// Rope branch count, never below 1
    pub reeving: u32,

    /// Hoist torque (% of rated)
    pub torque: Option<f64>,

    /// Filled in by the analytics merge
    pub cargo_type: Option<CargoType>,
}

impl Record {
    /// Creates a record with the essential fields; optional channels are empty.
    pub fn new(timestamp_millis: i64, radius: f64, height: f64, angle: f64) -> Self {
        Self {
            timestamp_millis,
            relative_millis: 0,
            radius,
            height,
            angle,
            weight: None,
            wind: None,
            reeving: 1,
            torque: None,
            cargo_type: None,
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = Some(weight);
        self
    }

    pub fn with_wind(mut self, wind: f64) -> Self {
        self.wind = Some(wind);
        self
    }

    pub fn with_reeving(mut self, reeving: i64) -> Self {
        self.reeving = normalize_reeving(Some(reeving));
        self
    }

    /// Hook position derived from radius, angle and height.
    pub fn hook_position(&self) -> Position {
        Position::from_polar(self.radius, self.angle, self.height)
    }

    /// Weight with a missing reading treated as an empty hook.
    #[inline]
    pub fn weight_or_zero(&self) -> f64 {
        self.weight.unwrap_or(0.0)
    }
}

/// Rope branch count: absent or non-positive readings become 1.
pub fn normalize_reeving(raw: Option<i64>) -> u32 {
    match raw {
        Some(r) if r >= 1 => u32::try_from(r).unwrap_or(u32::MAX),
        _ => 1,
    }
}

// ============================================================================
// RECORD SEQUENCE
// ============================================================================

/// The ordered, frozen history of one playback session.
///
/// Invariants:
/// - sorted ascending by `timestamp_millis` (stable: equal stamps keep ingestion order)
/// - `records[0].relative_millis == 0`
/// - every record has finite `radius`, `height` and `angle`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RecordSequence {
    records: Vec<Record>,
}

impl RecordSequence {
    /// Validates, sorts and re-bases a batch of ingested records.
    ///
    /// Non-finite optional channels (`weight`, `wind`, `torque`) are dropped to `None`;
    /// non-finite essentials are rejected.
    pub fn new(mut records: Vec<Record>) -> Result<Self, RecordError> {
        for (index, record) in records.iter_mut().enumerate() {
            if !record.radius.is_finite() {
                return Err(RecordError::NonFinite { index, field: "radius" });
            }
            if !record.height.is_finite() {
                return Err(RecordError::NonFinite { index, field: "height" });
            }
            if !record.angle.is_finite() {
                return Err(RecordError::NonFinite { index, field: "angle" });
            }
            if record.weight.is_some_and(|w| !w.is_finite()) {
                record.weight = None;
            }
            if record.wind.is_some_and(|w| !w.is_finite()) {
                record.wind = None;
            }
            if record.torque.is_some_and(|t| !t.is_finite()) {
                record.torque = None;
            }
            record.reeving = record.reeving.max(1);
        }

        records.sort_by_key(|r| r.timestamp_millis);

        if let Some(first) = records.first().map(|r| r.timestamp_millis) {
            for record in &mut records {
                record.relative_millis = record.timestamp_millis.saturating_sub(first);
            }
        }

        Ok(Self { records })
    }

    /// An empty history (controls disabled, nothing to analyse).
    pub fn empty() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Record> {
        self.records.get(index)
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.records.iter()
    }

    pub fn last_index(&self) -> usize {
        self.records.len().saturating_sub(1)
    }

    /// Relative time of the last record, or 0 with fewer than two records.
    pub fn total_duration_millis(&self) -> i64 {
        if self.records.len() < 2 {
            return 0;
        }
        self.records
            .last()
            .map(|r| r.relative_millis)
            .unwrap_or(0)
    }

    /// Relative time of the record at `index` (0 when out of range).
    pub fn relative_millis_at(&self, index: usize) -> i64 {
        self.records.get(index).map(|r| r.relative_millis).unwrap_or(0)
    }

    /// Replaces every record's cargo type in one pass.
    ///
    /// Records missing from `assignments` are reset to `None`.
    pub(crate) fn apply_cargo_types(&mut self, assignments: &HashMap<usize, Option<CargoType>>) {
        for (index, record) in self.records.iter_mut().enumerate() {
            record.cargo_type = assignments.get(&index).copied().flatten();
        }
    }
}

// ============================================================================
// ERRORS
// ============================================================================

/// Errors raised while building a record sequence.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RecordError {
    #[error("Record {index}: {field} is not a finite number")]
    NonFinite { index: usize, field: &'static str },
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_sequence_sorts_and_rebases() {
        let seq = RecordSequence::new(vec![
            Record::new(5_000, 10.0, 5.0, 0.0),
            Record::new(1_000, 10.0, 5.0, 0.0),
            Record::new(3_000, 10.0, 5.0, 0.0),
        ])
        .unwrap();

        let relative: Vec<i64> = seq.iter().map(|r| r.relative_millis).collect();
        assert_eq!(relative, vec![0, 2_000, 4_000]);
        assert_eq!(seq.total_duration_millis(), 4_000);
    }

    #[test]
    fn test_sequence_stable_for_equal_timestamps() {
        let seq = RecordSequence::new(vec![
            Record::new(1_000, 1.0, 0.0, 0.0),
            Record::new(1_000, 2.0, 0.0, 0.0),
            Record::new(0, 3.0, 0.0, 0.0),
        ])
        .unwrap();

        let radii: Vec<f64> = seq.iter().map(|r| r.radius).collect();
        assert_eq!(radii, vec![3.0, 1.0, 2.0]);
    }

    #[test]
    fn test_sequence_rejects_non_finite_essentials() {
        let err = RecordSequence::new(vec![
            Record::new(0, 1.0, 0.0, 0.0),
            Record::new(10, 1.0, f64::NAN, 0.0),
        ])
        .unwrap_err();
        assert_eq!(err, RecordError::NonFinite { index: 1, field: "height" });
    }

    #[test]
    fn test_sequence_drops_non_finite_optionals() {
        let seq = RecordSequence::new(vec![Record::new(0, 1.0, 0.0, 0.0)
            .with_weight(f64::INFINITY)
            .with_wind(3.0)])
        .unwrap();
        assert_eq!(seq.records()[0].weight, None);
        assert_eq!(seq.records()[0].wind, Some(3.0));
    }

    #[test]
    fn test_rebase_saturates_on_extreme_timestamps() {
        let seq = RecordSequence::new(vec![
            Record::new(i64::MAX, 1.0, 0.0, 0.0),
            Record::new(i64::MIN, 2.0, 0.0, 0.0),
        ])
        .unwrap();

        assert_eq!(seq.records()[0].relative_millis, 0);
        assert_eq!(seq.records()[1].relative_millis, i64::MAX);
        assert_eq!(seq.total_duration_millis(), i64::MAX);
    }

    #[test]
    fn test_total_duration_short_sequences() {
        assert_eq!(RecordSequence::empty().total_duration_millis(), 0);
        let single = RecordSequence::new(vec![Record::new(42, 1.0, 0.0, 0.0)]).unwrap();
        assert_eq!(single.total_duration_millis(), 0);
    }

    #[test]
    fn test_normalize_reeving() {
        assert_eq!(normalize_reeving(None), 1);
        assert_eq!(normalize_reeving(Some(0)), 1);
        assert_eq!(normalize_reeving(Some(-3)), 1);
        assert_eq!(normalize_reeving(Some(4)), 4);
    }

    #[test]
    fn test_hook_position_from_polar() {
        let record = Record::new(0, 20.0, 15.0, 90.0);
        let pos = record.hook_position();
        assert_relative_eq!(pos.x, 0.0, epsilon = 1e-9);
        assert_relative_eq!(pos.y, 15.0);
        assert_relative_eq!(pos.z, 20.0, epsilon = 1e-9);
    }

    #[test]
    fn test_horizontal_distance_ignores_height() {
        let a = Position::new(0.0, 0.0, 0.0);
        let b = Position::new(3.0, 50.0, 4.0);
        assert_relative_eq!(a.horizontal_distance_to(&b), 5.0);
        assert!(a.distance_to(&b) > 50.0);
    }

    #[test]
    fn test_cargo_label_mapping() {
        assert_eq!(CargoType::from_label("Concrete"), CargoType::Concrete);
        assert_eq!(CargoType::from_label("rebar"), CargoType::Rebar);
        assert_eq!(CargoType::from_label("bricks"), CargoType::Default);
    }

    #[test]
    fn test_apply_cargo_types_resets_unlisted() {
        let mut seq = RecordSequence::new(vec![
            Record::new(0, 1.0, 0.0, 0.0),
            Record::new(10, 1.0, 0.0, 0.0),
        ])
        .unwrap();

        let mut first = HashMap::new();
        first.insert(0, Some(CargoType::Panel));
        first.insert(1, Some(CargoType::Rebar));
        seq.apply_cargo_types(&first);

        let mut second = HashMap::new();
        second.insert(1, Some(CargoType::Concrete));
        seq.apply_cargo_types(&second);

        assert_eq!(seq.records()[0].cargo_type, None);
        assert_eq!(seq.records()[1].cargo_type, Some(CargoType::Concrete));
    }
}

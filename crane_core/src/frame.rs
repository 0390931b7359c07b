//! Frame resolution: relative time → record index.
//!
//! Records are time-sorted and playback moves time in small increments, so
//! resolution is an anchored linear scan from the current index rather than
//! a binary search. Successive queries during playback touch only a handful
//! of records.
//!
//! Tie-break for records sharing a relative time: the scan order decides.
//! A forward scan returns the lowest qualifying index at or after the
//! anchor; a backward scan returns the highest qualifying index at or before
//! the anchor.

use serde::{Deserialize, Serialize};

use crate::cargo::CargoHeuristic;
use crate::record::{CargoType, Position, RecordSequence};

/// Playback direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Forward,
    Backward,
}

impl Direction {
    /// +1.0 for forward, -1.0 for backward.
    #[inline]
    pub fn sign(self) -> f64 {
        match self {
            Direction::Forward => 1.0,
            Direction::Backward => -1.0,
        }
    }

    pub fn reversed(self) -> Self {
        match self {
            Direction::Forward => Direction::Backward,
            Direction::Backward => Direction::Forward,
        }
    }
}

/// Resolves `target_millis` to a record index, scanning from `anchor`.
///
/// The target is clamped to `[0, total_duration]` first. A forward scan is
/// used when playing forward or when the target is not earlier than the
/// anchor's own time; otherwise a backward scan.
pub fn resolve_index(
    records: &RecordSequence,
    anchor: usize,
    direction: Direction,
    target_millis: f64,
) -> usize {
    if records.len() < 2 {
        return 0;
    }

    let anchor = anchor.min(records.last_index());
    let total = records.total_duration_millis() as f64;
    let target = if target_millis.is_nan() {
        0.0
    } else {
        target_millis.clamp(0.0, total)
    };

    let anchor_time = records.relative_millis_at(anchor) as f64;
    if direction == Direction::Forward || target >= anchor_time {
        find_forward(records, anchor, target)
    } else {
        find_backward(records, anchor, target)
    }
}

/// First index >= `anchor` whose relative time is >= `target`, else the last index.
fn find_forward(records: &RecordSequence, anchor: usize, target: f64) -> usize {
    records.records()[anchor..]
        .iter()
        .position(|r| r.relative_millis as f64 >= target)
        .map(|offset| anchor + offset)
        .unwrap_or_else(|| records.last_index())
}

/// Scanning down from `anchor`, the first index whose relative time is <= `target`, else 0.
fn find_backward(records: &RecordSequence, anchor: usize, target: f64) -> usize {
    records.records()[..=anchor]
        .iter()
        .rposition(|r| r.relative_millis as f64 <= target)
        .unwrap_or(0)
}

// ============================================================================
// FRAME VIEW (renderer contract)
// ============================================================================

/// Everything a scene renderer needs to pose the crane for one frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameView {
    pub index: usize,
    pub timestamp_millis: i64,
    pub relative_millis: i64,
    pub trolley_radius: f64,
    pub angle_degrees: f64,
    pub hook_height: f64,
    pub weight: Option<f64>,
    /// Weight of the preceding record (drives the discharge animation)
    pub previous_weight: Option<f64>,
    pub reeving: u32,
    /// Annotated cargo type, or the heuristic fallback
    pub cargo_type: CargoType,
    pub wind_speed: Option<f64>,
    pub hook_position: Position,
}

impl FrameView {
    /// Builds the view for `index`, or `None` when out of range.
    pub fn at(records: &RecordSequence, index: usize, heuristic: &CargoHeuristic) -> Option<Self> {
        let record = records.get(index)?;
        let previous = index.checked_sub(1).and_then(|i| records.get(i));

        Some(Self {
            index,
            timestamp_millis: record.timestamp_millis,
            relative_millis: record.relative_millis,
            trolley_radius: record.radius,
            angle_degrees: record.angle,
            hook_height: record.height,
            weight: record.weight,
            previous_weight: previous.and_then(|p| p.weight),
            reeving: record.reeving,
            cargo_type: heuristic.resolve(previous, record),
            wind_speed: record.wind,
            hook_position: record.hook_position(),
        })
    }
}

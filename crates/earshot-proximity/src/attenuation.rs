//! Distance and attenuation: from two positions to a gain and a pan.
//!
//! Everything here is a pure function. No state, no I/O, no clock.

use earshot_protocol::PositionRecord;

use crate::{DEFAULT_FAR_DISTANCE, DEFAULT_NEAR_DISTANCE};

/// Offset from `from` to `to` as `(dx, dy, dz)`.
///
/// Returns `None` when the two records are in different regions: their
/// coordinates live in unrelated spaces and must never be compared.
pub fn offset(
    from: &PositionRecord,
    to: &PositionRecord,
) -> Option<(f64, f64, f64)> {
    if from.region != to.region {
        return None;
    }
    Some((
        to.x - from.x,
        to.y - from.y,
        to.z_or_zero() - from.z_or_zero(),
    ))
}

/// Euclidean distance between two records of the same region.
///
/// Missing elevation counts as `0`. Returns `None` across regions.
pub fn distance(from: &PositionRecord, to: &PositionRecord) -> Option<f64> {
    offset(from, to).map(|(dx, dy, dz)| (dx * dx + dy * dy + dz * dz).sqrt())
}

/// Stereo placement from the horizontal bearing of a source.
///
/// `cos(atan2(dy, dx))`: `1.0` is hard right, `-1.0` hard left, `0.0`
/// straight ahead or behind. A source at the listener's own position is
/// centred.
pub fn pan(dx: f64, dy: f64) -> f32 {
    if dx == 0.0 && dy == 0.0 {
        return 0.0;
    }
    dy.atan2(dx).cos().clamp(-1.0, 1.0) as f32
}

/// Linear distance-to-gain curve.
///
/// ```text
/// gain
///  1.0 ┤────╮
///      │     ╲
///      │      ╲
///  0.0 ┤       ╰──────────
///      └────┬─────┬────── distance
///         near   far
/// ```
///
/// Total over all inputs: `0`, `+∞`, and `NaN` (treated as silent) all
/// produce a gain in `[0, 1]`, and the curve never increases with distance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttenuationModel {
    near: f64,
    far: f64,
}

impl AttenuationModel {
    /// Creates a curve that is full volume up to `near` and silent from
    /// `far` on. If `far <= near` the curve is a step at `near`.
    pub fn new(near: f64, far: f64) -> Self {
        Self { near, far }
    }

    /// The gain for a source at `distance`.
    pub fn gain(&self, distance: f64) -> f32 {
        if distance.is_nan() {
            return 0.0;
        }
        if distance <= self.near {
            return 1.0;
        }
        if distance >= self.far {
            return 0.0;
        }
        ((self.far - distance) / (self.far - self.near)).clamp(0.0, 1.0) as f32
    }

    pub fn near(&self) -> f64 {
        self.near
    }

    pub fn far(&self) -> f64 {
        self.far
    }
}

impl Default for AttenuationModel {
    fn default() -> Self {
        Self::new(DEFAULT_NEAR_DISTANCE, DEFAULT_FAR_DISTANCE)
    }
}

//! Proximity configuration: the distances that shape what you hear.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::attenuation::AttenuationModel;

/// Distance at or below which a peer is heard at full volume.
pub const DEFAULT_NEAR_DISTANCE: f64 = 1.0;

/// Distance at or beyond which a peer is silent.
pub const DEFAULT_FAR_DISTANCE: f64 = 50.0;

/// Distance within which a peer counts as "nearby" for session membership.
pub const DEFAULT_NEARBY_CUTOFF: f64 = 60.0;

/// How long a peer may go without a position update before it is dropped.
pub const DEFAULT_PEER_TTL: Duration = Duration::from_secs(10);

/// Configuration for distance-based audio and session membership.
///
/// Two independent thresholds are at play:
///
/// ```text
///  0      near             far        cutoff
///  |──1.0──|────linear ramp──|───0.0────|──── not nearby ────▶
///                                        (session membership)
/// ```
///
/// `far_distance` shapes the *gain* curve; `nearby_cutoff` decides who is
/// listed as nearby and whether joining a room is worthwhile. A peer can be
/// nearby yet already silent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProximityConfig {
    /// Full volume at or below this distance.
    pub near_distance: f64,

    /// Silence at or beyond this distance.
    pub far_distance: f64,

    /// Maximum distance for the nearby list.
    pub nearby_cutoff: f64,

    /// Peers not refreshed within this window are expired.
    /// `None` keeps peers until they are overwritten.
    pub peer_ttl: Option<Duration>,
}

impl Default for ProximityConfig {
    fn default() -> Self {
        Self {
            near_distance: DEFAULT_NEAR_DISTANCE,
            far_distance: DEFAULT_FAR_DISTANCE,
            nearby_cutoff: DEFAULT_NEARBY_CUTOFF,
            peer_ttl: Some(DEFAULT_PEER_TTL),
        }
    }
}

impl ProximityConfig {
    /// Replaces out-of-range values so the config is safe to use.
    ///
    /// - Negative or non-finite `near_distance` becomes `0`.
    /// - Non-numeric (`NaN`) or negative `far_distance` / `nearby_cutoff`
    ///   fall back to their defaults.
    /// - A zero `peer_ttl` would expire every peer on every recompute, so
    ///   it falls back to the default.
    /// - `far_distance < near_distance` is kept (the curve degrades to a
    ///   step) but logged, since it is almost certainly a typo.
    pub fn validated(mut self) -> Self {
        if !self.near_distance.is_finite() || self.near_distance < 0.0 {
            warn!(value = self.near_distance, "invalid near_distance, using 0");
            self.near_distance = 0.0;
        }
        if self.far_distance.is_nan() || self.far_distance < 0.0 {
            warn!(
                value = self.far_distance,
                default = DEFAULT_FAR_DISTANCE,
                "invalid far_distance, using default"
            );
            self.far_distance = DEFAULT_FAR_DISTANCE;
        }
        if self.nearby_cutoff.is_nan() || self.nearby_cutoff < 0.0 {
            warn!(
                value = self.nearby_cutoff,
                default = DEFAULT_NEARBY_CUTOFF,
                "invalid nearby_cutoff, using default"
            );
            self.nearby_cutoff = DEFAULT_NEARBY_CUTOFF;
        }
        if self.peer_ttl.is_some_and(|ttl| ttl.is_zero()) {
            warn!(
                default_secs = DEFAULT_PEER_TTL.as_secs(),
                "peer_ttl is zero, using default"
            );
            self.peer_ttl = Some(DEFAULT_PEER_TTL);
        }
        if self.far_distance < self.near_distance {
            warn!(
                near = self.near_distance,
                far = self.far_distance,
                "far_distance below near_distance; attenuation becomes a step"
            );
        }
        self
    }

    /// The gain curve described by `near_distance` and `far_distance`.
    pub fn attenuation(&self) -> AttenuationModel {
        AttenuationModel::new(self.near_distance, self.far_distance)
    }
}

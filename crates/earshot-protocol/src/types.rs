//! Core protocol types for Earshot's positional feed.
//!
//! This module defines every type that travels "on the wire" from the
//! positional-update source, plus the small derived values (session keys,
//! nearby entries) that the coordinator hands to the UI.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

// ---------------------------------------------------------------------------
// Wire tokens
// ---------------------------------------------------------------------------

/// The raw form of an identifier as it appears in JSON.
///
/// Position servers are inconsistent about identifiers: some send
/// `"guid": "1234"`, others send `"guid": 1234`. `#[serde(untagged)]`
/// tells serde to try each variant in order until one fits, so both
/// spellings decode. Everything is normalized to a decimal string.
#[derive(Deserialize)]
#[serde(untagged)]
enum WireToken {
    Text(String),
    Signed(i64),
    Unsigned(u64),
}

impl WireToken {
    fn into_string(self) -> String {
        match self {
            Self::Text(s) => s,
            Self::Signed(n) => n.to_string(),
            Self::Unsigned(n) => n.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// An opaque, stable identifier for a participant.
///
/// This is a "newtype wrapper" around `String`, so an `Identity` can never
/// be passed where a [`Region`] is expected even though both are strings
/// underneath.
///
/// Decoding accepts either a string or an integer (see the manual
/// `Deserialize` impl below); encoding always emits a plain string
/// thanks to `#[serde(transparent)]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Creates an identity from anything string-like.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for Identity {
    fn deserialize<D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Self, D::Error> {
        WireToken::deserialize(deserializer).map(|t| Self(t.into_string()))
    }
}

impl From<Identity> for String {
    fn from(id: Identity) -> Self {
        id.0
    }
}

impl From<&str> for Identity {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for Identity {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<u64> for Identity {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A disjoint proximity universe: a map, level, or zone.
///
/// Two participants in different regions are never "near" each other,
/// no matter what their coordinates say.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Region(String);

impl Region {
    /// Creates a region from anything string-like.
    pub fn new(region: impl Into<String>) -> Self {
        Self(region.into())
    }

    /// Returns the region as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for Region {
    fn deserialize<D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Self, D::Error> {
        WireToken::deserialize(deserializer).map(|t| Self(t.into_string()))
    }
}

impl From<Region> for String {
    fn from(region: Region) -> Self {
        region.0
    }
}

impl From<&str> for Region {
    fn from(region: &str) -> Self {
        Self(region.to_string())
    }
}

impl From<u64> for Region {
    fn from(region: u64) -> Self {
        Self(region.to_string())
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// SessionKey
// ---------------------------------------------------------------------------

/// The name of a shared voice session ("room"), derived from a region.
///
/// Every region maps to exactly one key: region `7` becomes `room-7`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionKey(String);

impl SessionKey {
    /// Returns the session key for participants in `region`.
    pub fn for_region(region: &Region) -> Self {
        Self(format!("room-{region}"))
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// PositionRecord
// ---------------------------------------------------------------------------

/// One participant's position at one moment.
///
/// `#[serde(alias = "...")]` accepts the field names used by legacy
/// proximity servers (`guid`, `map`) in addition to ours.
///
/// `z` and `timestamp` are optional. A missing `z` counts as `0` for
/// distance purposes. `skip_serializing_if` keeps them out of the JSON
/// entirely when absent rather than emitting `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionRecord {
    /// Who this record describes.
    #[serde(alias = "guid")]
    pub identity: Identity,

    /// Which proximity universe the participant is in.
    #[serde(alias = "map")]
    pub region: Region,

    /// Horizontal coordinate.
    pub x: f64,

    /// Horizontal coordinate.
    pub y: f64,

    /// Elevation, if the source tracks it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z: Option<f64>,

    /// Source timestamp, opaque to Earshot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
}

impl PositionRecord {
    /// Creates a 2-D record with no elevation or timestamp.
    pub fn new(
        identity: impl Into<Identity>,
        region: impl Into<Region>,
        x: f64,
        y: f64,
    ) -> Self {
        Self {
            identity: identity.into(),
            region: region.into(),
            x,
            y,
            z: None,
            timestamp: None,
        }
    }

    /// Sets the elevation.
    pub fn with_z(mut self, z: f64) -> Self {
        self.z = Some(z);
        self
    }

    /// Elevation with the "absent means zero" rule applied.
    pub fn z_or_zero(&self) -> f64 {
        self.z.unwrap_or(0.0)
    }
}

// ---------------------------------------------------------------------------
// NearbyPeer
// ---------------------------------------------------------------------------

/// An entry of the externally visible "who can I hear" list.
///
/// Derived from the position store on every update, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearbyPeer {
    /// The peer's identity.
    pub identity: Identity,
    /// Euclidean distance from the local participant, in world units.
    pub distance: f64,
}

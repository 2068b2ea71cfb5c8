//! Proximity logic for Earshot.
//!
//! Everything in this crate is synchronous and free of I/O: the
//! coordinator owns a [`PositionStore`] and a [`MembershipPolicy`], feeds
//! them decoded records, and turns the results into audio and session
//! commands.
//!
//! # Key types
//!
//! - [`PositionStore`]: last known self and peer positions, nearby queries
//! - [`MembershipPolicy`]: decides when to join a region's voice session
//! - [`AttenuationModel`]: distance to gain curve
//! - [`ProximityConfig`]: distances, cutoff and peer expiry

mod attenuation;
mod config;
mod policy;
mod store;

pub use attenuation::{AttenuationModel, distance, offset, pan};
pub use config::{
    DEFAULT_FAR_DISTANCE, DEFAULT_NEAR_DISTANCE, DEFAULT_NEARBY_CUTOFF,
    DEFAULT_PEER_TTL, ProximityConfig,
};
pub use policy::{MembershipDecision, MembershipPolicy, decide};
pub use store::{PeerLocation, PositionStore};

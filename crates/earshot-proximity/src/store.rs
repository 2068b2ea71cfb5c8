//! The position store: where everyone was last seen.
//!
//! Holds the local participant's latest record ("self") and the latest
//! record of every other participant, across all regions. Nearby lists
//! are derived from it on demand and never cached.
//!
//! # Clock
//!
//! The store never reads the clock itself. Every time-dependent method
//! takes `now`, which keeps expiry deterministic in tests.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use earshot_protocol::{Identity, NearbyPeer, PositionRecord};

use crate::attenuation::{distance, offset};

/// A peer record plus the instant it was last refreshed.
#[derive(Debug, Clone)]
struct TrackedPeer {
    record: PositionRecord,
    last_seen: Instant,
}

/// Where a peer is, relative to the local participant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PeerLocation {
    /// Same region as self; offsets are from self to the peer.
    SameRegion { distance: f64, dx: f64, dy: f64 },
    /// Known, but in another region than self.
    OtherRegion,
    /// Never seen, expired, or self position unknown.
    Unknown,
}

/// Last known positions of the local participant and its peers.
#[derive(Debug, Default)]
pub struct PositionStore {
    self_state: Option<PositionRecord>,
    peers: HashMap<Identity, TrackedPeer>,
}

impl PositionStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies every record of one message.
    ///
    /// A record for `local` replaces the self state and drops any peer
    /// entry held under that identity; any other record replaces that
    /// peer's entry wholesale. Returns how many records were
    /// applied to peers (self updates are not counted).
    pub fn apply(
        &mut self,
        local: &Identity,
        records: Vec<PositionRecord>,
        now: Instant,
    ) -> usize {
        let mut peers_updated = 0;
        for record in records {
            if &record.identity == local {
                self.peers.remove(local);
                self.self_state = Some(record);
            } else {
                self.peers.insert(
                    record.identity.clone(),
                    TrackedPeer {
                        record,
                        last_seen: now,
                    },
                );
                peers_updated += 1;
            }
        }
        peers_updated
    }

    /// The local participant's latest record, if one has arrived.
    pub fn self_position(&self) -> Option<&PositionRecord> {
        self.self_state.as_ref()
    }

    /// A peer's latest record, whatever its region.
    pub fn peer(&self, identity: &Identity) -> Option<&PositionRecord> {
        self.peers.get(identity).map(|p| &p.record)
    }

    /// Peers in self's region within `cutoff`, nearest first.
    ///
    /// Empty when self's position is unknown.
    pub fn nearby(&self, cutoff: f64) -> Vec<NearbyPeer> {
        let Some(me) = &self.self_state else {
            return Vec::new();
        };

        let mut nearby: Vec<NearbyPeer> = self
            .peers
            .values()
            .filter(|p| p.record.identity != me.identity)
            .filter_map(|p| {
                distance(me, &p.record).map(|d| NearbyPeer {
                    identity: p.record.identity.clone(),
                    distance: d,
                })
            })
            .filter(|p| p.distance <= cutoff)
            .collect();

        nearby.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then_with(|| a.identity.cmp(&b.identity))
        });
        nearby
    }

    /// Locates a peer relative to self.
    pub fn locate(&self, identity: &Identity) -> PeerLocation {
        let (Some(me), Some(peer)) =
            (&self.self_state, self.peers.get(identity))
        else {
            return PeerLocation::Unknown;
        };
        match offset(me, &peer.record) {
            Some((dx, dy, dz)) => PeerLocation::SameRegion {
                distance: (dx * dx + dy * dy + dz * dz).sqrt(),
                dx,
                dy,
            },
            None => PeerLocation::OtherRegion,
        }
    }

    /// Removes every peer not refreshed within `ttl` of `now`.
    ///
    /// Returns the identities that were removed so callers can silence
    /// their audio.
    pub fn expire_stale(&mut self, now: Instant, ttl: Duration) -> Vec<Identity> {
        let mut expired = Vec::new();
        self.peers.retain(|identity, peer| {
            let stale = now.saturating_duration_since(peer.last_seen) > ttl;
            if stale {
                tracing::debug!(%identity, "peer position expired");
                expired.push(identity.clone());
            }
            !stale
        });
        expired
    }

    /// Forgets the self state, keeping peers.
    pub fn forget_self(&mut self) {
        self.self_state = None;
    }

    /// Drops one peer's entry. Returns whether it was known.
    pub fn forget_peer(&mut self, identity: &Identity) -> bool {
        self.peers.remove(identity).is_some()
    }

    /// Forgets everything.
    pub fn clear(&mut self) {
        self.self_state = None;
        self.peers.clear();
    }

    /// Number of known peers, all regions included.
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }
}
